pub mod register;
pub mod routes;
