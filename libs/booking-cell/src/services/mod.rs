pub mod booking;
pub mod conflict;
pub mod locks;
pub mod pricing;
pub mod slots;
pub mod validation;
