// Entity Models
// "Identity persists, values change"
//
// - Investor: canonical record created by promotion (UUID + unique normalized key)
// - Startup: externally supplied record, scored and matched each cycle

pub mod investor;
pub mod startup;

pub use investor::{CheckSize, Investor, InvestorStatus};
pub use startup::{ComponentInputs, Startup};
