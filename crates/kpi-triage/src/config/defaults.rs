//! Built-in term lists used when a configuration leaves a list unset.

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn subject_patterns() -> Vec<String> {
    owned(&[
        r"\b(kpi|kpis|dashboard|snapshot|scorecard|flash report)\b",
        r"\b(daily|weekly|monthly|mtd|ytd|month[- ]to[- ]date)\b.*\b(report|summary|update|numbers)\b",
        r"\b(cash|bank) (report|position|balance|snapshot)\b",
        r"\b(occupancy|census|pipeline|closings|production) (report|update|summary)\b",
    ])
}

pub fn body_kpi_keywords() -> Vec<String> {
    owned(&[
        "revenue",
        "sales",
        "cash",
        "balance",
        "pipeline",
        "occupancy",
        "census",
        "closings",
        "orders",
        "mtd",
        "ytd",
        "total",
    ])
}

pub fn meeting_patterns() -> Vec<String> {
    owned(&[
        r"(accepted|declined|tentative|canceled):",
        r"read meeting report",
        r"invitation:",
        r"automatic reply:",
        r"meeting request",
        r"out of office",
    ])
}

pub fn newsletter_markers() -> Vec<String> {
    owned(&[
        "unsubscribe",
        "view this email in your browser",
        "view in browser",
        "manage your preferences",
        "email preferences",
    ])
}

pub fn newsletter_local_parts() -> Vec<String> {
    owned(&[
        "newsletter",
        "no-reply",
        "noreply",
        "no_reply",
        "marketing",
        "info",
        "news",
        "updates",
        "notifications",
        "notify",
        "mailer-daemon",
        "do-not-reply",
        "donotreply",
    ])
}

pub fn quarantine_digest_patterns() -> Vec<String> {
    owned(&[
        r"quarantined?\s*message\s*report",
        r"quarantine\s*digest",
        r"spam\s*digest",
    ])
}

pub fn report_extensions() -> Vec<String> {
    owned(&["pdf", "xlsx", "xls", "csv"])
}

pub fn filename_keywords() -> Vec<String> {
    owned(&["kpi", "report", "snapshot", "dashboard", "summary", "census"])
}

pub fn noise_filename_patterns() -> Vec<String> {
    owned(&[r"^image\d{3}\.", r"^outlook-", r"^_\d{3}\.\w+$", r"^cid:"])
}

pub fn folders() -> Vec<String> {
    owned(&["Inbox"])
}

pub fn time_terms() -> Vec<String> {
    owned(&[
        "today",
        "current",
        "mtd",
        "month to date",
        "month-to-date",
        "daily report",
        "weekly snapshot",
        "week ending",
        "as of",
        "reporting period",
    ])
}

pub fn kpi_label_terms() -> Vec<String> {
    owned(&[
        "revenue",
        "cash balance",
        "bank balance",
        "pipeline",
        "occupancy",
        "census",
        "closings",
        "orders",
    ])
}

pub fn total_terms() -> Vec<String> {
    owned(&["total", "summary", "grand total", "mtd total", "ytd total"])
}

pub fn hard_reject_terms() -> Vec<String> {
    owned(&[
        "pro forma",
        "proforma",
        "irr",
        "waterfall",
        "offering",
        "equity raise",
        "capex budget",
        "replacement cost",
        "investment memorandum",
        "loan document",
        "change order",
        "tax bill",
        "hr agreement",
        "nda",
        "agenda",
        "purchase and sale agreement",
        "operations transfer agreement",
        "designation notice",
    ])
}

pub fn sheet_accept_terms() -> Vec<String> {
    owned(&["summary", "dashboard", "kpi", "mtd", "report", "census"])
}

pub fn sheet_reject_terms() -> Vec<String> {
    owned(&[
        "proforma",
        "pro forma",
        "waterfall",
        "irr",
        "underwriting",
        "model",
        "sensitivity",
    ])
}

pub fn report_filename_hints() -> Vec<String> {
    owned(&[
        "census",
        "snapshot",
        "dashboard",
        "balance",
        "production",
        "report",
        "kpi",
        "occupancy",
        "daily",
        "weekly",
        "monthly",
        "summary",
        "revenue",
        "cash",
    ])
}

pub fn invoice_terms() -> Vec<String> {
    owned(&[
        "invoice",
        "amount due",
        "due date",
        "remit",
        "remittance",
        "bill to",
        "bill-to",
    ])
}

/// Label variants per KPI field, keyed by field name.
pub fn synonyms() -> Vec<(&'static str, Vec<String>)> {
    vec![
        (
            "revenue",
            owned(&[
                "revenue",
                "rev",
                "sales",
                "income",
                "gross revenue",
                "gross sales",
                "total revenue",
                "net revenue",
                "total sales",
            ]),
        ),
        (
            "cash",
            owned(&[
                "cash",
                "cash balance",
                "bank balance",
                "cash on hand",
                "available cash",
                "total cash",
                "checking",
                "savings",
                "ending balance",
                "current balance",
                "ending cash",
            ]),
        ),
        (
            "pipeline_value",
            owned(&[
                "pipeline",
                "pipeline value",
                "pipeline $",
                "pipeline total",
                "in contract",
                "contracts in pipeline",
                "pending pipeline",
                "active pipeline",
                "pipeline balance",
            ]),
        ),
        (
            "closings_count",
            owned(&[
                "closings",
                "closed",
                "funded",
                "settled",
                "files closed",
                "closings count",
                "closed count",
                "units closed",
                "transactions closed",
                "closings today",
            ]),
        ),
        (
            "orders_count",
            owned(&[
                "orders",
                "order count",
                "new orders",
                "open orders",
                "orders count",
                "total orders",
                "files opened",
                "new files",
                "order volume",
            ]),
        ),
        (
            "occupancy",
            owned(&[
                "occupancy",
                "occ",
                "occupied",
                "% occupied",
                "occupancy rate",
                "census",
                "bed occupancy",
                "unit occupancy",
                "occupancy %",
                "census count",
            ]),
        ),
    ]
}
