//! Paths on willys.se used by the client.

pub const LOGIN: &str = "/login";
pub const CSRF_TOKEN: &str = "/axfood/rest/csrf-token";
pub const CUSTOMER: &str = "/axfood/rest/customer";
pub const CART: &str = "/axfood/rest/cart";
pub const CART_ADD_PRODUCTS: &str = "/axfood/rest/cart/addProducts";
pub const CART_DELIVERY_MODE: &str = "/axfood/rest/cart/delivery-mode/homeDelivery";
pub const CART_DELIVERY_ADDRESS: &str = "/axfood/rest/cart/delivery-address";
pub const CART_POSTAL_CODE: &str = "/axfood/rest/cart/postal-code";
pub const SEARCH: &str = "/search";
pub const SLOT_HOME_DELIVERY: &str = "/axfood/rest/slot/homeDelivery";
pub const SLOT_IN_CART: &str = "/axfood/rest/slot/slotInCart";
pub const SHIPPING_DELIVERY: &str = "/axfood/rest/shipping/delivery";
pub const CHECKOUT: &str = "/kassa";

/// Header carrying the anti-forgery token on protected requests.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";

/// Append URL-encoded query parameters to a path.
pub(crate) fn with_query<'a>(
    path: &str,
    params: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}
