pub mod admission;
pub mod dispatcher;
pub mod http_client;
