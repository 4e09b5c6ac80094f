mod notify;
mod presets;

pub use notify::hook_notify;
pub use presets::{delete_preset, get_session, list_presets, save_preset, update_preset};
