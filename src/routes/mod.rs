pub mod classify_route;
pub mod health_route;
