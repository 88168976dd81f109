//! In-flight connection jobs

use std::path::PathBuf;
use std::sync::Weak;

use rk_core::{Secret, ServerId};

use crate::client::ConsoleClient;

/// Everything the completion handler needs, captured when the job starts
/// so credentials are never read from the store a second time
pub(crate) struct PendingConnectionJob {
    /// Console waiting for the kernel; not kept alive by the job
    pub client: Weak<dyn ConsoleClient>,
    pub server_id: ServerId,
    pub kernel_id: String,
    pub connection_file: PathBuf,
    pub hostname: String,
    pub sshkey: Option<PathBuf>,
    pub password: Option<Secret>,
}
