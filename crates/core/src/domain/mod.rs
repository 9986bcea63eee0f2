pub mod approval;
pub mod meter;
pub mod permit;
pub mod role;
pub mod user;
pub mod worker;
