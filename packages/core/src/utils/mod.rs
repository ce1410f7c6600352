// Утилиты

pub mod attempts;
pub mod b64;
pub mod serialization;
