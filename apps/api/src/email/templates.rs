use crate::email::{EmailError, EmailSender};
use crate::matching::recommend::Recommendation;
use crate::models::agent::Agent;
use crate::models::booking::Booking;
use crate::models::lead::{Lead, FALLBACK_DISPLAY_NAME};

pub fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(heading: &str, inner: &str) -> String {
    format!(
        "<html><body style=\"font-family:Arial,sans-serif;color:#222\">\
         <h2>{heading}</h2>{inner}\
         <p style=\"color:#888;font-size:12px\">This is an automated message.</p>\
         </body></html>"
    )
}

/// Tells an agent that a lead was routed to them.
pub async fn send_lead_email(
    sender: &dyn EmailSender,
    agent: &Agent,
    lead: &Lead,
) -> Result<bool, EmailError> {
    let Some(to) = agent.email.as_deref() else {
        return Ok(false);
    };
    let contact = [lead.email.as_deref(), lead.phone.as_deref()]
        .into_iter()
        .flatten()
        .map(escape)
        .collect::<Vec<_>>()
        .join(" / ");
    let inner = format!(
        "<p>Hello {agent},</p><p>A new lead has been assigned to you.</p>\
         <ul><li><b>Name:</b> {name}</li><li><b>Contact:</b> {contact}</li>\
         <li><b>Source:</b> {source:?}</li><li><b>Score:</b> {score}</li></ul>",
        agent = escape(agent.name.as_deref().unwrap_or("there")),
        name = escape(lead.display_name()),
        source = lead.source,
        score = lead.lead_score,
    );
    sender
        .send(to, "New lead assigned to you", &layout("New lead", &inner))
        .await
}

/// Booking status notice for the customer.
pub async fn send_booking_email(
    sender: &dyn EmailSender,
    booking: &Booking,
) -> Result<bool, EmailError> {
    let Some(to) = booking.customer_email.as_deref() else {
        return Ok(false);
    };
    let inner = format!(
        "<p>Dear {name},</p><p>Your booking <b>{id}</b> is now <b>{status}</b>.</p>\
         <p>Total: {total:.2}</p>",
        name = escape(
            booking
                .customer_name
                .as_deref()
                .unwrap_or(FALLBACK_DISPLAY_NAME)
        ),
        id = booking.id,
        status = booking.status.label(),
        total = booking.total_price,
    );
    let subject = format!("Your booking is {}", booking.status.label());
    sender
        .send(to, &subject, &layout("Booking update", &inner))
        .await
}

/// Ranked property suggestions for a lead.
pub async fn send_property_recommendation_email(
    sender: &dyn EmailSender,
    lead: &Lead,
    recommendations: &[Recommendation],
) -> Result<bool, EmailError> {
    let Some(to) = lead.email.as_deref() else {
        return Ok(false);
    };
    let rows: String = recommendations
        .iter()
        .map(|r| {
            let price = r
                .property
                .cheapest_price()
                .map(|p| format!("from {p:.2}"))
                .unwrap_or_else(|| "price on request".to_string());
            format!(
                "<li><b>{}</b> ({}) {}</li>",
                escape(&r.property.property.name),
                escape(r.property.property.city.as_deref().unwrap_or("")),
                price
            )
        })
        .collect();
    let inner = format!(
        "<p>Hi {},</p><p>We picked these spaces for you:</p><ul>{rows}</ul>",
        escape(lead.display_name())
    );
    sender
        .send(
            to,
            "Properties picked for you",
            &layout("Recommended for you", &inner),
        )
        .await
}
