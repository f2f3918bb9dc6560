mod log_manager;
mod log_record;
mod recovery_manager;

pub use log_manager::LogManager;
pub use log_record::{LogPayload, LogRecord, LOG_HEADER_SIZE};
pub use recovery_manager::RecoveryManager;
