use thiserror::Error;

use crate::config::ConfigError;
use crate::event::EventError;
use crate::interpreter::EngineError;
use crate::script::ScriptFault;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    // event error
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    // embedded runtime fault
    #[error("Script fault: {0}")]
    Script(#[from] ScriptFault),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type TansyResult<T> = Result<T, Error>;

// エラー作成用のヘルパー関数
impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
