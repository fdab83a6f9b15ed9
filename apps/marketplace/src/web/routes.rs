// apps/marketplace/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{
  address_handlers, admin_handlers, checkout_handlers, meta_handlers, order_handlers, product_handlers, quote_handlers,
  rfq_handlers, webhook_handlers,
};

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(meta_handlers::health_check_handler))
      .route("/lifecycle", web::get().to(meta_handlers::lifecycle_tables_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("", web::put().to(product_handlers::upsert_product_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      .service(
        web::scope("/rfqs")
          .route("", web::post().to(rfq_handlers::submit_rfq_handler))
          .route("", web::get().to(rfq_handlers::list_rfqs_handler))
          .route("/{rfq_id}", web::get().to(rfq_handlers::get_rfq_handler))
          .route("/{rfq_id}/quotes", web::post().to(quote_handlers::submit_quote_handler)),
      )
      .service(
        web::scope("/quotes")
          .route("/{quote_id}/accept", web::post().to(quote_handlers::accept_quote_handler))
          .route("/{quote_id}/reject", web::post().to(quote_handlers::reject_quote_handler))
          .route("/{quote_id}/counter", web::post().to(quote_handlers::counter_quote_handler))
          .route("/{quote_id}/revise", web::post().to(quote_handlers::revise_quote_handler)),
      )
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/status", web::post().to(order_handlers::advance_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route(
            "/{order_id}/payment-intent",
            web::post().to(order_handlers::payment_intent_handler),
          )
          .route(
            "/{order_id}/confirm-receipt",
            web::post().to(order_handlers::confirm_receipt_handler),
          )
          .route("/{order_id}/dispute", web::post().to(order_handlers::open_dispute_handler))
          .route(
            "/{order_id}/dispute/resolve",
            web::post().to(order_handlers::resolve_dispute_handler),
          )
          .route("/{order_id}/invoice", web::post().to(order_handlers::issue_invoice_handler)),
      )
      .service(
        web::scope("/addresses")
          .route("", web::put().to(address_handlers::upsert_address_handler))
          .route("", web::get().to(address_handlers::list_addresses_handler)),
      )
      .service(
        web::scope("/admin")
          .route("/rfqs/expire", web::post().to(admin_handlers::expire_rfqs_handler))
          .route(
            "/escrow/release-due",
            web::post().to(admin_handlers::release_due_escrow_handler),
          ),
      )
      .service(
        // the {source} segment names the payment provider
        web::scope("/webhooks").route("/{source}", web::post().to(webhook_handlers::payment_webhook_handler)),
      ),
  );
}
