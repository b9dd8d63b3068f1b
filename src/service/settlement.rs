//! Settlement Generator
//!
//! End-of-auction resolution: winners, runner-ups and per-bidder totals,
//! derived entirely from committed lot and bid-history state. Same inputs,
//! same report, every time.
use crate::auction::{format_usd, Amount, BidRecord, Bidder, Lot, LotId};
use crate::persistence::Persistence;
use crate::service::mailer::{Attachment, DispatcherHandle, Mail};
use crate::store::{BidHistory, LotStore, Seq};
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunnerUp {
    /// Only one distinct bidder ever bid on the lot.
    None,
    /// History could not be read; settlement carried on without it.
    Unknown,
    Bid {
        name: String,
        email: String,
        amount: Amount,
    },
}

/// One winning lot in the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LotResult {
    pub lot_id: LotId,
    pub lot_name: String,
    pub link: String,
    pub group: Option<u32>,
    pub winner: Bidder,
    pub amount: Amount,
    pub runner_up: RunnerUp,
}

/// Everything one winning bidder owes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BidderTotal {
    pub bidder: Bidder,
    pub lots: Vec<LotId>,
    pub total: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementReport {
    pub rows: Vec<LotResult>,
    pub totals: Vec<BidderTotal>,
}

impl SettlementReport {
    /// The export artifact: one CSV row per winning lot.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(
            "Winner Name,Winner Email,Item Name,Winning Bid,Item Link,Group #,\
             Runner-up Name,Runner-up Email,Runner-up Bid\n",
        );
        for row in &self.rows {
            let group = match row.group {
                Some(group) => group.to_string(),
                None => "General".to_owned(),
            };
            let (ru_name, ru_email, ru_bid) = match &row.runner_up {
                RunnerUp::None => (String::new(), String::new(), String::new()),
                RunnerUp::Unknown => ("unknown".to_owned(), String::new(), String::new()),
                RunnerUp::Bid {
                    name,
                    email,
                    amount,
                } => (name.clone(), email.clone(), format_usd(*amount)),
            };
            out.push_str(&format!(
                "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"\n",
                csv_escape(&row.winner.name),
                csv_escape(&row.winner.email),
                csv_escape(&row.lot_name),
                format_usd(row.amount),
                row.link,
                group,
                csv_escape(&ru_name),
                csv_escape(&ru_email),
                ru_bid,
            ));
        }
        out
    }
}

fn csv_escape(s: &str) -> String {
    s.replace('"', "\"\"")
}

/// Resolve winners and runner-ups from committed state.
///
/// A single lot's history failing to read does not abort the rest: the lot
/// settles with [`RunnerUp::Unknown`] and a logged warning.
pub fn settle<P: Persistence>(
    connection: &mut P::Connection,
    lots: &dyn LotStore<Persistence = P>,
    history: &dyn BidHistory<Persistence = P>,
    base_url: &str,
) -> Result<SettlementReport> {
    let base = base_url.trim_end_matches('/');
    let mut rows = Vec::new();

    for lot in lots.list(connection)? {
        let winner = match (&lot.leader, lot.retired) {
            (Some(winner), false) => winner.clone(),
            _ => continue,
        };

        let runner_up = match history.for_lot(connection, &lot.id) {
            Ok(records) => resolve_runner_up(&records, &winner),
            Err(e) => {
                warn!(lot_id = %lot.id, error = %e, "runner-up resolution failed");
                RunnerUp::Unknown
            }
        };

        rows.push(lot_result(&lot, winner, runner_up, base));
    }

    let mut totals: BTreeMap<String, BidderTotal> = BTreeMap::new();
    for row in &rows {
        let entry = totals
            .entry(row.winner.email.to_ascii_lowercase())
            .or_insert_with(|| BidderTotal {
                bidder: row.winner.clone(),
                lots: Vec::new(),
                total: 0,
            });
        entry.lots.push(row.lot_id.clone());
        entry.total += row.amount;
    }

    let report = SettlementReport {
        rows,
        totals: totals.into_values().collect(),
    };
    info!(
        lots = report.rows.len(),
        winners = report.totals.len(),
        "settlement resolved"
    );
    Ok(report)
}

fn lot_result(lot: &Lot, winner: Bidder, runner_up: RunnerUp, base: &str) -> LotResult {
    LotResult {
        lot_id: lot.id.clone(),
        lot_name: lot.name.clone(),
        link: format!("{}/lots/{}", base, lot.id),
        group: lot.group_id,
        winner,
        amount: lot.current_bid,
        runner_up,
    }
}

/// Highest-amount record from anyone other than the winner; ties go to the
/// earlier record.
fn resolve_runner_up(records: &[(Seq, BidRecord)], winner: &Bidder) -> RunnerUp {
    records
        .iter()
        .filter(|(_, record)| !winner.same_email(&record.bidder.email))
        .max_by(|(seq_a, a), (seq_b, b)| a.amount.cmp(&b.amount).then(seq_b.cmp(seq_a)))
        .map(|(_, record)| RunnerUp::Bid {
            name: record.bidder.name.clone(),
            email: record.bidder.email.clone(),
            amount: record.amount,
        })
        .unwrap_or(RunnerUp::None)
}

/// Queue the consolidated winner mails and the admin report mail as one
/// batch, so the dispatcher paces them against the provider rate limit.
pub fn dispatch_report(
    report: &SettlementReport,
    dispatcher: &DispatcherHandle,
    admin_email: Option<&str>,
) {
    let mut mails = Vec::new();

    for total in &report.totals {
        let mut body = format!(
            "<h3>You won!</h3>\
             <p>Hello {},</p>\
             <p>You placed the winning bid on:</p><ul>",
            total.bidder.name,
        );
        for row in report
            .rows
            .iter()
            .filter(|row| row.winner.same_email(&total.bidder.email))
        {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a>: {}</li>",
                row.link,
                row.lot_name,
                format_usd(row.amount),
            ));
        }
        body.push_str(&format!(
            "</ul><p>Total owed: <strong>{}</strong></p>",
            format_usd(total.total),
        ));

        mails.push(Mail {
            to: total.bidder.email.clone(),
            subject: "Auction results: you won".to_owned(),
            body,
            attachment: None,
        });
    }

    if let Some(admin) = admin_email {
        mails.push(Mail {
            to: admin.to_owned(),
            subject: "Auction settlement report".to_owned(),
            body: format!(
                "<p>{} winning lots, {} winning bidders. Full report attached.</p>",
                report.rows.len(),
                report.totals.len(),
            ),
            attachment: Some(Attachment {
                filename: "winners.csv".to_owned(),
                content: report.to_csv(),
            }),
        });
    }

    dispatcher.enqueue_batch(mails);
}
