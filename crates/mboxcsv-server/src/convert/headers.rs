//! Header value flattening
//!
//! A parsed header value may be an address list, decoded text, a text list,
//! or a date. Each variant gets its own rendering path and every path ends in
//! one flat string per CSV cell, so the export always opens cleanly in a
//! spreadsheet.

use mail_parser::{Addr, Address, HeaderValue};

/// Render a single mailbox as `Display Name <address>`
///
/// Falls back to the bare address, then to the bare display name.
pub fn render_addr(addr: &Addr) -> String {
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) => format!("{} <{}>", name, address),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}

/// Render an address list header as comma-joined mailboxes
///
/// Group syntax is flattened to its member mailboxes.
pub fn render_address(address: &Address) -> String {
    address
        .iter()
        .map(render_addr)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render an optional address header, empty when absent
pub fn render_address_opt(address: Option<&Address>) -> String {
    address.map(render_address).unwrap_or_default()
}

/// Render any header value to flat cell text, one arm per variant
pub fn render_header_value(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Address(address) => render_address(address),
        HeaderValue::Text(text) => text.to_string(),
        HeaderValue::TextList(parts) => {
            parts.iter().map(|p| p.as_ref()).collect::<Vec<_>>().join(", ")
        },
        HeaderValue::DateTime(date) => date.to_rfc3339(),
        // Content types, received traces, and empty values carry nothing a
        // tabular export can use
        _ => String::new(),
    }
}
