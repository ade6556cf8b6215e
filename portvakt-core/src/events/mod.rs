pub mod bus;
pub mod scan;
