pub mod calendar;
pub mod project;
pub mod review;
pub mod user;
pub mod whitelist;
