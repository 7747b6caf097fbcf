//! Test utilities associated with ids.

use rand::Rng;
use talk_loader_api::ResourceId;

/// Create a random resource id that is also a safe file name.
pub fn random_resource_id() -> ResourceId {
    let suffix: u64 = rand::thread_rng().gen();
    format!("file-{suffix:016x}").into()
}
