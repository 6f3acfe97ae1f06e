use dora_engine::EngineError;
use thiserror::Error;

pub type TpccResult<T> = Result<T, TpccError>;

#[derive(Error, Debug)]
pub enum TpccError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
