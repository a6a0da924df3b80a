//! NCR report surfaces: the spreadsheet export and the printable document.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Write;

use crate::models::{ActionCategory, NcrRecord};
use crate::queries::ncr_queries::NcrRow;

/// Byte-order mark so spreadsheet tools detect UTF-8.
pub const CSV_BOM: &str = "\u{FEFF}";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

pub const CSV_HEADERS: [&str; 17] = [
    "NCR No",
    "Date",
    "Status",
    "Product Code",
    "Product Name",
    "Customer",
    "From Branch",
    "To Destination",
    "Quantity",
    "Unit",
    "Problem Detail",
    "Problem Source",
    "Has Cost",
    "Cost Amount",
    "Cost Responsible",
    "Action",
    "Return Status",
];

const NOT_RETURNED: &str = "Not Returned";

pub fn export_filename(on: NaiveDate) -> String {
    format!("ncr_report_{}.csv", on.format("%Y-%m-%d"))
}

/// Quotes a text cell, doubling embedded quotes.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

pub fn action_label(action: Option<ActionCategory>) -> &'static str {
    match action {
        Some(ActionCategory::Reject) => "Reject",
        Some(ActionCategory::Scrap) => "Scrap",
        None => "N/A",
    }
}

fn csv_line(row: &NcrRow) -> String {
    let item = &row.item;
    let return_status = row
        .return_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| NOT_RETURNED.to_string());
    let has_cost = if item.carries_cost() { "Yes" } else { "No" };

    [
        quote(&row.ncr_no),
        row.date.format("%Y-%m-%d").to_string(),
        quote(&row.status.to_string()),
        quote(&item.product_code),
        quote(&item.product_name),
        quote(&item.customer_name),
        quote(&item.branch),
        quote(&item.destination_customer),
        item.quantity.to_string(),
        quote(&item.unit),
        quote(&row.problem_detail),
        quote(&item.problem_source),
        quote(has_cost),
        item.cost_amount.to_string(),
        quote(item.cost_responsible.as_deref().unwrap_or("")),
        quote(action_label(row.action)),
        quote(&return_status),
    ]
    .join(",")
}

/// Comma-delimited export, one line per NCR item, prefixed with a BOM.
pub fn ncr_csv(rows: &[NcrRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADERS.join(","));
    lines.extend(rows.iter().map(csv_line));
    format!("{}{}\n", CSV_BOM, lines.join("\n"))
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn check(ticked: bool) -> &'static str {
    if ticked {
        "&#9745;"
    } else {
        "&#9744;"
    }
}

fn qty(ticked: bool, value: Decimal) -> String {
    if ticked && !value.is_zero() {
        value.to_string()
    } else {
        String::new()
    }
}

const PRINT_STYLE: &str = "body{font-family:sans-serif;font-size:12px;margin:24px}\
h1{font-size:18px;text-align:center;margin:0}\
h2{font-size:14px;text-align:center;margin:4px 0 16px}\
table{border-collapse:collapse;width:100%;margin-bottom:12px}\
td,th{border:1px solid #333;padding:4px;text-align:left}\
.canceled{color:#b00;font-weight:bold;text-align:center;font-size:16px}\
.checklist td{border:none}";

/// Printable NCR document. Read-only; layout follows the paper form.
pub fn render_print_view(ncr: &NcrRecord, company: &str) -> String {
    let header = &ncr.header;
    let mut html = String::new();

    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>NCR {no}</title>\
         <style>{style}</style></head><body>\
         <h1>{company}</h1><h2>Non-Conformance Report (NCR)</h2>",
        no = escape_html(header.display_no()),
        style = PRINT_STYLE,
        company = escape_html(company),
    );

    if ncr.is_canceled() {
        let by = header.canceled_by.as_deref().unwrap_or("");
        let at = header
            .canceled_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        let _ = write!(
            html,
            "<p class=\"canceled\">CANCELED {} {}</p>",
            escape_html(by),
            escape_html(&at)
        );
    }

    let field = |value: &Option<String>| escape_html(value.as_deref().unwrap_or(""));
    let _ = write!(
        html,
        "<table><tr><th>NCR No</th><td>{}</td><th>Date</th><td>{}</td></tr>\
         <tr><th>To</th><td>{}</td><th>Copy to</th><td>{}</td></tr>\
         <tr><th>Found by</th><td>{}</td><th>PO No</th><td>{}</td></tr></table>",
        escape_html(header.display_no()),
        header.date.format("%Y-%m-%d"),
        field(&header.to_dept),
        field(&header.copy_to),
        field(&header.founder),
        field(&header.po_no),
    );

    html.push_str("<table class=\"checklist\"><tr>");
    for (index, (label, ticked)) in header.problems.checklist().iter().enumerate() {
        if index > 0 && index % 4 == 0 {
            html.push_str("</tr><tr>");
        }
        let _ = write!(html, "<td>{} {}</td>", check(*ticked), label);
    }
    let other = header.problems.problem_other_text.as_deref().unwrap_or("");
    let _ = write!(
        html,
        "<td>{} Other: {}</td></tr></table>",
        check(header.problems.problem_other),
        escape_html(other)
    );

    let _ = write!(
        html,
        "<table><tr><th>Problem detail</th></tr><tr><td>{}</td></tr></table>",
        escape_html(&header.problem_detail)
    );

    html.push_str(
        "<table><tr><th>#</th><th>Product code</th><th>Product name</th><th>Customer</th>\
         <th>Branch</th><th>Destination</th><th>Qty</th><th>Unit</th><th>Problem source</th>\
         <th>Cost</th><th>Responsible</th></tr>",
    );
    for (index, item) in ncr.items.iter().enumerate() {
        let cost = if item.carries_cost() {
            item.cost_amount.to_string()
        } else {
            "-".to_string()
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            index + 1,
            escape_html(&item.product_code),
            escape_html(&item.product_name),
            escape_html(&item.customer_name),
            escape_html(&item.branch),
            escape_html(&item.destination_customer),
            item.quantity,
            escape_html(&item.unit),
            escape_html(&item.problem_source),
            cost,
            field(&item.cost_responsible),
        );
    }
    html.push_str("</table>");

    let actions = &header.actions;
    let rows = [
        ("Reject", actions.action_reject, actions.action_reject_qty, None),
        ("Reject and sort", actions.action_reject_sort, actions.action_reject_sort_qty, None),
        (
            "Rework",
            actions.action_rework,
            actions.action_rework_qty,
            actions.action_rework_method.as_deref(),
        ),
        (
            "Special acceptance",
            actions.action_special_acceptance,
            actions.action_special_acceptance_qty,
            actions.action_special_acceptance_reason.as_deref(),
        ),
        ("Scrap", actions.action_scrap, actions.action_scrap_qty, None),
        (
            "Scrap and replace",
            actions.action_scrap_replace,
            actions.action_scrap_replace_qty,
            None,
        ),
    ];
    html.push_str("<table><tr><th>Action</th><th></th><th>Qty</th><th>Note</th></tr>");
    for (label, ticked, amount, note) in rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            label,
            check(ticked),
            qty(ticked, amount),
            escape_html(note.unwrap_or("")),
        );
    }
    html.push_str(
        "</table><table><tr><th>Reported by</th><th>Approved by</th><th>Acknowledged by</th></tr>\
         <tr><td>&nbsp;</td><td>&nbsp;</td><td>&nbsp;</td></tr></table></body></html>",
    );
    html
}
