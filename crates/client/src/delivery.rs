//! Home delivery: deliverability, address, slots and checkout.

use reqwest::{Method, StatusCode};
use tracing::{debug, info, instrument, warn};
use willys_core::validation::{
    normalize_postal_code, validate_delivery_address, validate_postal_code,
};
use willys_core::{DeliveryAddress, DeliveryInfo, TimeSlot};

use crate::endpoints;
use crate::error::WillysError;
use crate::session::{WillysClient, decode_json, expect_status};
use crate::wire::{
    DEFAULT_PICKING_FEE, DeliverabilityResponse, SlotsResponse, slot_selection_body,
};

const UPDATE_OK: [StatusCode; 2] = [StatusCode::OK, StatusCode::NO_CONTENT];

impl WillysClient {
    /// Returns `true` if the store delivers to `postal_code`.
    ///
    /// A non-success response means "not deliverable", not an error.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed postal code
    /// - `Api` for transport failures or an undecodable body
    #[instrument(skip(self))]
    pub async fn check_deliverability(&self, postal_code: &str) -> Result<bool, WillysError> {
        validate_postal_code(postal_code)?;

        let path = format!(
            "{}/{}/deliverability?b2b=false",
            endpoints::SHIPPING_DELIVERY,
            normalize_postal_code(postal_code)
        );
        let response = self.execute(Method::GET, &path, None, false).await?;
        if response.status() != StatusCode::OK {
            debug!(status = %response.status(), "deliverability check rejected");
            return Ok(false);
        }

        let body: DeliverabilityResponse =
            decode_json(response, &path, "failed to parse deliverability response").await?;
        Ok(body.deliverable)
    }

    /// Switch the cart to home delivery.
    ///
    /// # Errors
    ///
    /// Returns `Api` if the store rejects the change.
    #[instrument(skip(self))]
    pub async fn set_delivery_mode(&self) -> Result<(), WillysError> {
        let path =
            endpoints::with_query(endpoints::CART_DELIVERY_MODE, [("newSuggestedStoreId", "")]);
        let response = self.execute(Method::POST, &path, None, true).await?;
        expect_status(response, &UPDATE_OK, &path, "set delivery mode failed").await?;
        Ok(())
    }

    /// Submit the delivery address, then its postal code.
    ///
    /// # Errors
    ///
    /// - `Validation` for a missing or over-long field or a bad postal code
    /// - `Api` if either submission is rejected
    #[instrument(skip_all)]
    pub async fn set_delivery_address(&self, address: &DeliveryAddress) -> Result<(), WillysError> {
        validate_delivery_address(address)?;
        let postal_code = normalize_postal_code(&address.postal_code);

        let path = endpoints::with_query(
            endpoints::CART_DELIVERY_ADDRESS,
            address_params(address, &postal_code),
        );
        let response = self.execute(Method::POST, &path, None, true).await?;
        expect_status(
            response,
            &UPDATE_OK,
            endpoints::CART_DELIVERY_ADDRESS,
            "set delivery address failed",
        )
        .await?;

        let path = endpoints::with_query(
            endpoints::CART_POSTAL_CODE,
            [("postalCode", postal_code.as_str())],
        );
        let response = self.execute(Method::POST, &path, None, true).await?;
        expect_status(response, &UPDATE_OK, &path, "set postal code failed").await?;

        debug!("delivery address set");
        Ok(())
    }

    /// List home delivery slots for `postal_code`, in the store's order.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed postal code
    /// - `Api` for a non-success or undecodable response
    #[instrument(skip(self))]
    pub async fn get_available_time_slots(
        &self,
        postal_code: &str,
    ) -> Result<Vec<TimeSlot>, WillysError> {
        validate_postal_code(postal_code)?;

        let postal_code = normalize_postal_code(postal_code);
        let path = endpoints::with_query(
            endpoints::SLOT_HOME_DELIVERY,
            [("postalCode", postal_code.as_str()), ("b2b", "false")],
        );
        let response = self.execute(Method::GET, &path, None, false).await?;
        let response =
            expect_status(response, &[StatusCode::OK], &path, "get time slots failed").await?;
        let body: SlotsResponse =
            decode_json(response, &path, "failed to parse time slots response").await?;

        let slots: Vec<TimeSlot> = body.slots.into_iter().map(|s| s.into_time_slot()).collect();
        debug!(
            count = slots.len(),
            available = slots.iter().filter(|s| s.available).count(),
            "listed time slots"
        );
        Ok(slots)
    }

    /// Book `slot`, echoing its routing tokens back unmodified.
    ///
    /// # Errors
    ///
    /// Returns `Api` if the store rejects the booking.
    #[instrument(skip_all, fields(slot_id = %slot.slot_id))]
    pub async fn select_time_slot(&self, slot: &TimeSlot) -> Result<(), WillysError> {
        let path = format!(
            "{}/{}?isTmsSlot=true",
            endpoints::SLOT_IN_CART,
            urlencoding::encode(&slot.slot_id)
        );
        let body = slot_selection_body(slot);
        let response = self.execute(Method::POST, &path, Some(&body), true).await?;
        expect_status(response, &UPDATE_OK, &path, "select time slot failed").await?;
        Ok(())
    }

    /// Full delivery setup: deliverability, delivery mode, address, slot.
    ///
    /// Stops at the first failing step.
    ///
    /// # Errors
    ///
    /// - `Validation` with field `postal_code` if the store does not deliver there
    /// - any error from the individual steps
    #[instrument(skip_all, fields(slot_id = %slot.slot_id))]
    pub async fn setup_delivery(
        &self,
        address: &DeliveryAddress,
        slot: &TimeSlot,
    ) -> Result<DeliveryInfo, WillysError> {
        if !self.check_deliverability(&address.postal_code).await? {
            warn!("postal code not deliverable");
            return Err(WillysError::validation(
                "postal_code",
                format!("delivery not available for postal code {}", address.postal_code),
            ));
        }

        self.set_delivery_mode().await?;
        self.set_delivery_address(address).await?;
        self.select_time_slot(slot).await?;

        info!(date = %slot.date, window = %slot.window(), "delivery booked");
        Ok(DeliveryInfo::new(address.clone(), slot.clone(), DEFAULT_PICKING_FEE))
    }

    /// URL of the store's checkout page. Not fetched.
    #[must_use]
    pub fn checkout_url(&self) -> String {
        format!("{}{}", self.base_url(), endpoints::CHECKOUT)
    }
}

/// Form fields the delivery-address endpoint expects, in its naming.
fn address_params<'a>(
    address: &'a DeliveryAddress,
    postal_code: &'a str,
) -> Vec<(&'a str, &'a str)> {
    let mut params = vec![
        ("firstName", address.first_name.as_str()),
        ("lastName", address.last_name.as_str()),
        ("addressLine1", address.address.as_str()),
        ("addressLine2", ""),
        ("postalCode", postal_code),
        ("town", address.city.as_str()),
        ("cellphone", ""),
        ("longitude", ""),
        ("latitude", ""),
    ];
    if let Some(door_code) = address.door_code.as_deref().filter(|c| !c.is_empty()) {
        params.push(("doorCode", door_code));
    }
    if let Some(message) = address.message_to_driver.as_deref().filter(|m| !m.is_empty()) {
        params.push(("messageToDriver", message));
    }
    params
}
