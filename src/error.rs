use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown robot {robot_id:?}")]
    UnknownRobot { robot_id: String },

    #[error("Unknown task {task_id:?}")]
    UnknownTask { task_id: String },

    #[error("Unknown allocation method {method:?}, valid methods: auction, hungarian")]
    InvalidMethod { method: String },

    #[error("Multiple leaders after committed election: {leaders:?}")]
    DuplicateLeaders { leaders: Vec<String> },

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
