pub mod external_services;
pub mod logging;
pub mod scratch;
