//! Cart operations.
//!
//! The store has no remove endpoint: lines are removed or reduced by setting
//! their quantity through the add-products call.

use reqwest::{Method, StatusCode};
use tracing::{debug, info, instrument};
use willys_core::Cart;
use willys_core::validation::{validate_product_code, validate_quantity};

use crate::endpoints;
use crate::error::WillysError;
use crate::session::{WillysClient, decode_json, expect_status};
use crate::wire::{AddProductsRequest, CartResponse};

const MUTATION_OK: [StatusCode; 2] = [StatusCode::OK, StatusCode::CREATED];
const CLEAR_OK: [StatusCode; 2] = [StatusCode::OK, StatusCode::NO_CONTENT];

impl WillysClient {
    /// Add `quantity` pieces of a product and return the updated cart.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed code or a quantity outside `1..=999`
    /// - `NotFound` if the store does not know the product
    /// - `Api` for other failures
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        product_code: &str,
        quantity: i64,
    ) -> Result<Cart, WillysError> {
        validate_product_code(product_code)?;
        let quantity = validate_quantity(quantity)?;

        let endpoint = endpoints::CART_ADD_PRODUCTS;
        let response = self.set_quantity(product_code, quantity).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(WillysError::NotFound {
                resource: "product".to_string(),
                id: product_code.to_string(),
            });
        }
        expect_status(response, &MUTATION_OK, endpoint, "add to cart failed").await?;

        info!(quantity, "added to cart");
        self.get_cart().await
    }

    /// Fetch the current cart.
    ///
    /// # Errors
    ///
    /// Returns `Api` for a non-success or undecodable response.
    #[instrument(skip(self))]
    pub async fn get_cart(&self) -> Result<Cart, WillysError> {
        let endpoint = endpoints::CART;
        let response = self.execute(Method::GET, endpoint, None, false).await?;
        let response =
            expect_status(response, &[StatusCode::OK], endpoint, "get cart failed").await?;
        let body: CartResponse =
            decode_json(response, endpoint, "failed to parse cart response").await?;
        Ok(Cart::from(body))
    }

    /// Remove `quantity` pieces of a product, or the whole line when
    /// `quantity` is `None` or zero.
    ///
    /// Removing a product that is not in the cart is a no-op and returns the
    /// cart as read.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a malformed product code, `Api` if reading or
    /// updating the cart fails.
    #[instrument(skip(self))]
    pub async fn remove_from_cart(
        &self,
        product_code: &str,
        quantity: Option<u32>,
    ) -> Result<Cart, WillysError> {
        validate_product_code(product_code)?;

        let new_quantity = match quantity.filter(|q| *q > 0) {
            None => 0,
            Some(remove) => {
                let current = self.get_cart().await?;
                let Some(item) = current.item(product_code) else {
                    debug!("product not in cart");
                    return Ok(current);
                };
                item.quantity.saturating_sub(remove)
            }
        };

        let response = self.set_quantity(product_code, new_quantity).await?;
        expect_status(
            response,
            &MUTATION_OK,
            endpoints::CART_ADD_PRODUCTS,
            "remove from cart failed",
        )
        .await?;

        info!(new_quantity, "updated cart line");
        self.get_cart().await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns `Api` if the store rejects the request.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), WillysError> {
        let endpoint = endpoints::CART;
        let response = self.execute(Method::DELETE, endpoint, None, true).await?;
        expect_status(response, &CLEAR_OK, endpoint, "clear cart failed").await?;
        info!("cleared cart");
        Ok(())
    }

    async fn set_quantity(
        &self,
        product_code: &str,
        quantity: u32,
    ) -> Result<reqwest::Response, WillysError> {
        let endpoint = endpoints::CART_ADD_PRODUCTS;
        let body = serde_json::to_value(AddProductsRequest::single(product_code, quantity))
            .map_err(|e| {
                WillysError::api_with(None, endpoint, "failed to encode cart request", e)
            })?;
        self.execute(Method::POST, endpoint, Some(&body), true).await
    }
}
