// Route exports
pub mod recognize;

use actix_web::web;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(recognize::configure);
}
