// --- File: crates/psiclinic_mercadopago/src/status.rs ---
//! Provider status strings mapped onto the clinic's payment lifecycle.

use psiclinic_common::PaymentStatus;
use tracing::warn;

/// Maps a Mercado Pago payment status onto [`PaymentStatus`].
///
/// Unknown statuses are treated as still pending so they never confirm anything.
pub fn map_status(raw: &str) -> PaymentStatus {
    match raw {
        "pending" | "authorized" | "in_process" | "in_mediation" => PaymentStatus::Pending,
        "approved" => PaymentStatus::Approved,
        "rejected" => PaymentStatus::Rejected,
        "cancelled" => PaymentStatus::Cancelled,
        "refunded" | "charged_back" => PaymentStatus::Refunded,
        other => {
            warn!("[Mercado Pago] Unknown payment status '{}', treating as pending", other);
            PaymentStatus::Pending
        }
    }
}

/// Patient-facing message for a rejected payment's `status_detail`.
pub fn rejection_message(status_detail: Option<&str>) -> &'static str {
    match status_detail.unwrap_or_default() {
        "cc_rejected_bad_filled_card_number" => "Confira o número do cartão.",
        "cc_rejected_bad_filled_date" => "Confira a data de validade do cartão.",
        "cc_rejected_bad_filled_security_code" => "Confira o código de segurança do cartão.",
        "cc_rejected_bad_filled_other" => "Confira os dados do cartão.",
        "cc_rejected_blacklist" | "cc_rejected_high_risk" => {
            "Não conseguimos processar seu pagamento. Use outro meio de pagamento."
        }
        "cc_rejected_call_for_authorize" => {
            "Autorize o pagamento junto à operadora do cartão e tente novamente."
        }
        "cc_rejected_card_disabled" => {
            "Ligue para a operadora do cartão para ativá-lo ou use outro cartão."
        }
        "cc_rejected_duplicated_payment" => {
            "Você já efetuou um pagamento com esse valor. Caso precise pagar novamente, use outro cartão."
        }
        "cc_rejected_insufficient_amount" => "O cartão possui saldo insuficiente.",
        "cc_rejected_invalid_installments" => "O cartão não aceita o número de parcelas escolhido.",
        "cc_rejected_max_attempts" => {
            "Você atingiu o limite de tentativas. Use outro cartão ou outro meio de pagamento."
        }
        _ => "Pagamento recusado. Tente novamente ou use outro meio de pagamento.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_statuses_are_pending() {
        for raw in ["pending", "authorized", "in_process", "in_mediation"] {
            assert_eq!(map_status(raw), PaymentStatus::Pending, "{raw}");
        }
    }

    #[test]
    fn chargebacks_count_as_refunds() {
        assert_eq!(map_status("charged_back"), PaymentStatus::Refunded);
        assert_eq!(map_status("refunded"), PaymentStatus::Refunded);
    }

    #[test]
    fn unknown_status_never_approves() {
        assert_eq!(map_status("something_new"), PaymentStatus::Pending);
        assert_eq!(map_status("APPROVED"), PaymentStatus::Pending);
    }

    proptest::proptest! {
        #[test]
        fn only_the_exact_approved_string_approves(raw in "[a-zA-Z_]{0,16}") {
            let mapped = map_status(&raw);
            proptest::prop_assert_eq!(mapped == PaymentStatus::Approved, raw == "approved");
        }
    }

    #[test]
    fn rejection_messages_have_a_fallback() {
        assert_eq!(
            rejection_message(Some("cc_rejected_insufficient_amount")),
            "O cartão possui saldo insuficiente."
        );
        assert_eq!(rejection_message(None), rejection_message(Some("whatever")));
    }
}
