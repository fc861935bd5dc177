pub mod inventory;
pub mod provision;
