// apps/marketplace/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::{ChangeSet, StoreError};
use crate::errors::Result as AppResult;
use crate::models::{Actor, Product, ProductInput, Role};
use crate::state::AppState;

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(app_state: web::Data<AppState>) -> AppResult<HttpResponse> {
  let products = app_state.store.list_products().await?;
  info!("Fetched {} products.", products.len());
  Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

#[instrument(name = "handler::get_product", skip(app_state, path), fields(product_id = %path.as_ref()))]
pub async fn get_product_handler(app_state: web::Data<AppState>, path: web::Path<Uuid>) -> AppResult<HttpResponse> {
  let product = app_state.store.get_product(path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(product))
}

/// Suppliers maintain their own catalogue entries.
#[instrument(name = "handler::upsert_product", skip(app_state, req_payload), fields(user_id = %actor.user_id))]
pub async fn upsert_product_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ProductInput>,
  actor: Actor,
) -> AppResult<HttpResponse> {
  actor.require(&[Role::Supplier])?;
  let input = req_payload.into_inner();
  let existing = match input.id {
    Some(id) => match app_state.store.get_product(id).await {
      Ok(product) => Some(product),
      Err(StoreError::NotFound { .. }) => None,
      Err(e) => return Err(e.into()),
    },
    None => None,
  };

  let product = Product::from_input(actor.user_id, input, existing.as_ref(), app_state.clock.now())?;
  let mut changes = ChangeSet::new();
  changes.upsert_product(&product, existing.as_ref());
  app_state.store.commit(changes).await?;
  info!("Supplier {} saved product {}.", actor.user_id, product.id);

  if existing.is_some() {
    Ok(HttpResponse::Ok().json(product))
  } else {
    Ok(HttpResponse::Created().json(product))
  }
}
