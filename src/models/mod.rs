pub mod assignment;
pub mod earning;
pub mod order;
pub mod partner;
pub mod tracking;
