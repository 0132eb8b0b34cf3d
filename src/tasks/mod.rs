pub mod security_cleanup;

pub use security_cleanup::{run_security_cleanup, start_security_cleanup_task};
