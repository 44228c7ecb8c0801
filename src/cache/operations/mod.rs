pub mod dedupe;
pub mod location;
pub mod presence;
