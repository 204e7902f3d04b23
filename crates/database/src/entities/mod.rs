pub mod beneficiary;
pub mod beneficiary_transaction;
pub mod claim;
pub mod community;
pub mod inflow;
pub mod manager;
pub mod proposal;
pub mod sea_orm_active_enums;
pub mod sync_state;
