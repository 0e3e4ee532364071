pub mod facade;
pub mod validator;

pub use facade::{DistributedStore, GetReply, PutReply};
pub use validator::{AcceptAllValidator, OpinionValidator, RecordValidator};
