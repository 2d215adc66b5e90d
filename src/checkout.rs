//! Checkout State Machine
//!
//! `Address -> Payment -> Review -> Submitting -> Completed`. Entered data is
//! kept across "back" transitions. A failed submission passes through
//! `Failed` and settles back at `Review` with the error message kept.

use serde::Serialize;
use std::fmt;
use validator::Validate;
use crate::auth::Principal;
use crate::domain::aggregates::{CartLedger, Order, ShippingAddress};
use crate::domain::value_objects::{PaymentSelection, PaymentSummary};
use crate::orders::OrderAssembler;
use crate::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStep { Address, Payment, Review, Submitting, Completed, Failed }

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

#[derive(Debug)]
pub struct Checkout {
    user_id: String,
    step: CheckoutStep,
    shipping: Option<ShippingAddress>,
    payment: Option<PaymentSelection>,
    last_error: Option<String>,
    order: Option<Order>,
}

/// What a presentation layer needs to render the current step.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView<'a> {
    pub step: CheckoutStep,
    pub shipping: Option<&'a ShippingAddress>,
    pub payment: Option<PaymentSummary>,
    pub last_error: Option<&'a str>,
    pub order_id: Option<&'a str>,
    pub order: Option<&'a Order>,
}

impl Checkout {
    /// Starts a checkout. Requires a signed-in user and a non-empty cart.
    pub fn begin(principal: Option<&Principal>, cart: &CartLedger) -> Result<Self> {
        let principal = principal.ok_or(StorefrontError::NotAuthenticated)?;
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        tracing::debug!(user_id = %principal.uid(), "checkout started");
        Ok(Self { user_id: principal.uid().to_string(), step: CheckoutStep::Address, shipping: None, payment: None, last_error: None, order: None })
    }

    pub fn step(&self) -> CheckoutStep { self.step }
    pub fn shipping(&self) -> Option<&ShippingAddress> { self.shipping.as_ref() }
    pub fn payment(&self) -> Option<&PaymentSelection> { self.payment.as_ref() }
    pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }
    pub fn order(&self) -> Option<&Order> { self.order.as_ref() }
    pub fn user_id(&self) -> &str { &self.user_id }

    pub fn view(&self) -> CheckoutView<'_> {
        CheckoutView {
            step: self.step, shipping: self.shipping.as_ref(), payment: self.payment.as_ref().map(PaymentSelection::redact),
            last_error: self.last_error.as_deref(), order_id: self.order.as_ref().map(|o| o.id.as_str()), order: self.order.as_ref(),
        }
    }

    fn expect_step(&self, expected: &[CheckoutStep], action: &'static str) -> Result<()> {
        if expected.contains(&self.step) { Ok(()) } else { Err(StorefrontError::InvalidTransition { from: self.step, action }) }
    }

    fn go(&mut self, to: CheckoutStep) {
        tracing::debug!(user_id = %self.user_id, from = %self.step, %to, "checkout step");
        self.step = to;
    }

    /// Address step. The entered data is kept even when it does not validate.
    pub fn validate_shipping(&mut self, shipping: ShippingAddress) -> Result<()> {
        self.expect_step(&[CheckoutStep::Address], "submit shipping")?;
        let outcome = shipping.validate();
        self.shipping = Some(shipping);
        outcome?;
        self.go(CheckoutStep::Payment);
        Ok(())
    }

    pub fn validate_payment(&mut self, payment: PaymentSelection) -> Result<()> {
        self.expect_step(&[CheckoutStep::Payment], "submit payment")?;
        payment.validate()?;
        self.payment = Some(payment);
        self.go(CheckoutStep::Review);
        Ok(())
    }

    pub fn back_to_address(&mut self) -> Result<()> {
        self.expect_step(&[CheckoutStep::Payment, CheckoutStep::Review], "go back to address")?;
        self.go(CheckoutStep::Address);
        Ok(())
    }

    pub fn back_to_payment(&mut self) -> Result<()> {
        self.expect_step(&[CheckoutStep::Review], "go back to payment")?;
        self.go(CheckoutStep::Payment);
        Ok(())
    }

    /// Places the order from `cart`, clearing it on success.
    pub async fn place_order(&mut self, cart: &mut CartLedger, assembler: &OrderAssembler) -> Result<Order> {
        self.expect_step(&[CheckoutStep::Review], "place order")?;
        let (Some(shipping), Some(payment)) = (self.shipping.clone(), self.payment.clone()) else {
            return Err(StorefrontError::InvalidTransition { from: self.step, action: "place order" });
        };
        self.go(CheckoutStep::Submitting);
        match assembler.assemble(cart, shipping, &payment, &self.user_id).await {
            Ok(order) => {
                cart.clear();
                self.last_error = None;
                self.order = Some(order.clone());
                self.go(CheckoutStep::Completed);
                Ok(order)
            }
            Err(e) => {
                self.go(CheckoutStep::Failed);
                tracing::warn!(user_id = %self.user_id, error = %e, "order placement failed");
                self.last_error = Some(e.to_string());
                self.go(CheckoutStep::Review);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Identity, Role};
    use crate::domain::events::testing::RecordingPublisher;
    use crate::orders::testing::{address, card, product, store_with};
    use crate::domain::value_objects::CardDetails;
    use std::sync::Arc;

    fn shopper() -> Principal {
        Principal { identity: Identity { uid: "u1".into(), email: "u1@example.com".into() }, role: Role::Customer }
    }

    fn cart() -> CartLedger {
        let mut cart = CartLedger::new();
        cart.add_item(&product("p1", 1000, 2), 2).unwrap();
        cart
    }

    fn at_review(cart: &CartLedger) -> Checkout {
        let mut checkout = Checkout::begin(Some(&shopper()), cart).unwrap();
        checkout.validate_shipping(address()).unwrap();
        checkout.validate_payment(card()).unwrap();
        checkout
    }

    #[test]
    fn test_begin_guards() {
        assert!(matches!(Checkout::begin(None, &cart()), Err(StorefrontError::NotAuthenticated)));
        assert!(matches!(Checkout::begin(Some(&shopper()), &CartLedger::new()), Err(StorefrontError::EmptyCart)));
        assert_eq!(Checkout::begin(Some(&shopper()), &cart()).unwrap().step(), CheckoutStep::Address);
    }

    #[test]
    fn test_bad_zip_stays_on_address() {
        let mut checkout = Checkout::begin(Some(&shopper()), &cart()).unwrap();
        let mut shipping = address();
        shipping.zip = "1234".into();
        let Err(StorefrontError::Validation(errors)) = checkout.validate_shipping(shipping) else { panic!("expected validation error") };
        assert!(errors.field_errors().contains_key("zip"));
        assert_eq!(checkout.step(), CheckoutStep::Address);
        assert_eq!(checkout.shipping().map(|s| s.zip.as_str()), Some("1234"));

        let mut shipping = address();
        shipping.zip = "12345".into();
        checkout.validate_shipping(shipping).unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Payment);
    }

    #[test]
    fn test_short_card_number_stays_on_payment() {
        let mut checkout = Checkout::begin(Some(&shopper()), &cart()).unwrap();
        checkout.validate_shipping(address()).unwrap();
        let short = PaymentSelection::Card(CardDetails::new("4111 1111 1111 111", "12/27", "123"));
        let Err(StorefrontError::Validation(errors)) = checkout.validate_payment(short) else { panic!("expected validation error") };
        assert!(errors.field_errors().contains_key("card_number"));
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        checkout.validate_payment(PaymentSelection::Card(CardDetails::new("4111111111111111", "12/27", "123"))).unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Review);
    }

    #[test]
    fn test_cash_skips_card_rules() {
        let mut checkout = Checkout::begin(Some(&shopper()), &cart()).unwrap();
        checkout.validate_shipping(address()).unwrap();
        checkout.validate_payment(PaymentSelection::Cash).unwrap();
        assert_eq!(checkout.view().payment, Some(PaymentSummary::Cash));
    }

    #[test]
    fn test_back_preserves_data() {
        let cart = cart();
        let mut checkout = at_review(&cart);
        checkout.back_to_address().unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Address);
        assert_eq!(checkout.shipping(), Some(&address()));
        assert!(checkout.payment().is_some());
        checkout.validate_shipping(address()).unwrap();
        checkout.validate_payment(PaymentSelection::Mobile).unwrap();
        checkout.back_to_payment().unwrap();
        assert_eq!(checkout.step(), CheckoutStep::Payment);
        assert_eq!(checkout.payment(), Some(&PaymentSelection::Mobile));
    }

    #[test]
    fn test_out_of_order_actions_are_refused() {
        let mut checkout = Checkout::begin(Some(&shopper()), &cart()).unwrap();
        assert!(matches!(checkout.validate_payment(PaymentSelection::Cash), Err(StorefrontError::InvalidTransition { from: CheckoutStep::Address, .. })));
        assert!(checkout.back_to_payment().is_err());
        assert!(checkout.back_to_address().is_err());
    }

    #[tokio::test]
    async fn test_place_order_clears_cart() {
        let store = Arc::new(store_with(&[product("p1", 1000, 2)]));
        let assembler = OrderAssembler::new(store, Arc::new(RecordingPublisher::default()));
        let mut cart = cart();
        let mut checkout = at_review(&cart);
        let order = checkout.place_order(&mut cart, &assembler).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(checkout.step(), CheckoutStep::Completed);
        assert_eq!(order.user_id, "u1");
        assert_eq!(checkout.order().map(|o| o.id.as_str()), Some(order.id.as_str()));
        assert!(checkout.place_order(&mut cart, &assembler).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_placement_returns_to_review() {
        let store = Arc::new(store_with(&[product("p1", 1000, 1)]));
        let assembler = OrderAssembler::new(store, Arc::new(RecordingPublisher::default()));
        let mut cart = cart();
        let mut checkout = at_review(&cart);
        let err = checkout.place_order(&mut cart, &assembler).await.unwrap_err();
        assert!(matches!(err, StorefrontError::InsufficientStock(_)));
        assert_eq!(checkout.step(), CheckoutStep::Review);
        assert!(checkout.last_error().unwrap().contains("p1"));
        assert_eq!(cart.item_count(), 1);
        assert!(checkout.order().is_none());
    }
}
