pub mod round_robin;
pub mod safe_converter;
