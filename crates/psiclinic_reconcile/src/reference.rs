//! External references: how a provider payment points back at a local row.
//!
//! Bookings use their id as-is; event registrations are prefixed with `EVENTO_`.
//! A payment without a reference is never matched heuristically.

use std::fmt;

pub const REGISTRATION_PREFIX: &str = "EVENTO_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentTarget {
    Booking(String),
    Registration(String),
}

impl PaymentTarget {
    pub fn from_external_reference(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        match reference.strip_prefix(REGISTRATION_PREFIX) {
            Some("") => None,
            Some(id) => Some(PaymentTarget::Registration(id.to_string())),
            None => Some(PaymentTarget::Booking(reference.to_string())),
        }
    }

    pub fn external_reference(&self) -> String {
        match self {
            PaymentTarget::Booking(id) => id.clone(),
            PaymentTarget::Registration(id) => format!("{}{}", REGISTRATION_PREFIX, id),
        }
    }

    pub fn booking_id(&self) -> Option<&str> {
        match self {
            PaymentTarget::Booking(id) => Some(id),
            PaymentTarget::Registration(_) => None,
        }
    }

    pub fn registration_id(&self) -> Option<&str> {
        match self {
            PaymentTarget::Registration(id) => Some(id),
            PaymentTarget::Booking(_) => None,
        }
    }
}

impl fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentTarget::Booking(id) => write!(f, "booking {}", id),
            PaymentTarget::Registration(id) => write!(f, "registration {}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_both_kinds() {
        assert_eq!(
            PaymentTarget::from_external_reference("b-1"),
            Some(PaymentTarget::Booking("b-1".into()))
        );
        assert_eq!(
            PaymentTarget::from_external_reference("EVENTO_r-9"),
            Some(PaymentTarget::Registration("r-9".into()))
        );
    }

    #[test]
    fn blank_references_do_not_match() {
        assert_eq!(PaymentTarget::from_external_reference(""), None);
        assert_eq!(PaymentTarget::from_external_reference("   "), None);
        assert_eq!(PaymentTarget::from_external_reference("EVENTO_"), None);
    }

    proptest! {
        #[test]
        fn reference_survives_a_round_trip(id in "[a-z0-9-]{1,36}", registration in any::<bool>()) {
            let target = if registration {
                PaymentTarget::Registration(id)
            } else {
                PaymentTarget::Booking(id)
            };
            let parsed = PaymentTarget::from_external_reference(&target.external_reference());
            prop_assert_eq!(parsed, Some(target));
        }
    }
}
