//! Message templates (pt-BR).
//!
//! Every template renders a subject, an HTML body for email and a short
//! plain-text body for SMS/WhatsApp.

use chrono::NaiveDate;
use psiclinic_common::format_brl;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// What a confirmed booking looks like to the people involved.
#[derive(Debug, Clone)]
pub struct BookingNotice {
    pub patient_name: String,
    pub professional_name: String,
    pub service_name: String,
    pub date: NaiveDate,
    pub time: String,
    pub amount: Decimal,
    pub meeting_link: Option<String>,
    pub meeting_password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegistrationNotice {
    pub name: String,
    pub event_title: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct RefundNotice {
    pub name: Option<String>,
    pub amount: Decimal,
    pub reason: String,
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// `14:00:00` -> `14:00`
fn short_time(time: &str) -> &str {
    time.get(..5).unwrap_or(time)
}

fn when(notice: &BookingNotice) -> String {
    format!(
        "{} às {}",
        notice.date.format("%d/%m/%Y"),
        short_time(&notice.time)
    )
}

fn meeting_html(notice: &BookingNotice) -> String {
    match &notice.meeting_link {
        Some(link) => {
            let mut html = format!(
                "<p>Link da sessão: <a href=\"{0}\">{0}</a></p>",
                escape(link)
            );
            if let Some(password) = &notice.meeting_password {
                html.push_str(&format!("<p>Senha: {}</p>", escape(password)));
            }
            html
        }
        None => "<p>O link da sessão será enviado em breve.</p>".to_string(),
    }
}

pub fn booking_confirmed_patient(notice: &BookingNotice) -> RenderedMessage {
    let when = when(notice);
    let subject = format!("Consulta confirmada - {}", when);
    let html = format!(
        "<h2>Olá, {name}!</h2>\
         <p>Seu pagamento foi aprovado e sua consulta está confirmada.</p>\
         <ul><li>Profissional: {professional}</li><li>Serviço: {service}</li>\
         <li>Data: {when}</li><li>Valor: {amount}</li></ul>{meeting}",
        name = escape(&notice.patient_name),
        professional = escape(&notice.professional_name),
        service = escape(&notice.service_name),
        when = when,
        amount = format_brl(notice.amount),
        meeting = meeting_html(notice),
    );
    let mut text = format!(
        "Consulta confirmada com {} em {}.",
        notice.professional_name, when
    );
    if let Some(link) = &notice.meeting_link {
        text.push_str(&format!(" Link: {}", link));
    }
    RenderedMessage { subject, html, text }
}

pub fn booking_confirmed_professional(notice: &BookingNotice) -> RenderedMessage {
    let when = when(notice);
    let subject = format!("Nova consulta confirmada - {}", when);
    let html = format!(
        "<h2>Olá, {professional}!</h2>\
         <p>Uma nova consulta foi confirmada.</p>\
         <ul><li>Paciente: {patient}</li><li>Serviço: {service}</li>\
         <li>Data: {when}</li></ul>{meeting}",
        professional = escape(&notice.professional_name),
        patient = escape(&notice.patient_name),
        service = escape(&notice.service_name),
        when = when,
        meeting = meeting_html(notice),
    );
    let text = format!(
        "Nova consulta confirmada: {} em {}.",
        notice.patient_name, when
    );
    RenderedMessage { subject, html, text }
}

pub fn registration_confirmed(notice: &RegistrationNotice) -> RenderedMessage {
    let subject = format!("Inscrição confirmada - {}", notice.event_title);
    let html = format!(
        "<h2>Olá, {name}!</h2>\
         <p>Recebemos o pagamento de {amount} e sua inscrição em <strong>{event}</strong> está confirmada.</p>",
        name = escape(&notice.name),
        amount = format_brl(notice.amount),
        event = escape(&notice.event_title),
    );
    let text = format!("Inscrição confirmada em {}.", notice.event_title);
    RenderedMessage { subject, html, text }
}

pub fn refund_notice(notice: &RefundNotice) -> RenderedMessage {
    let amount = format_brl(notice.amount);
    let subject = format!("Reembolso de {} realizado", amount);
    let greeting = match &notice.name {
        Some(name) => format!("Olá, {}!", escape(name)),
        None => "Olá!".to_string(),
    };
    let html = format!(
        "<h2>{greeting}</h2>\
         <p>Realizamos o reembolso de <strong>{amount}</strong> referente ao seu pagamento.</p>\
         <p>Motivo: {reason}</p>",
        greeting = greeting,
        amount = amount,
        reason = escape(&notice.reason),
    );
    let text = format!("Reembolso de {} realizado. Motivo: {}", amount, notice.reason);
    RenderedMessage { subject, html, text }
}
