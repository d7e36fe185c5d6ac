use crate::schema::{CanonicalFinancials, ReportingUnit, StatementRecord, TokenUsage};
use log::{debug, warn};

/// Folds per-batch records into one filing's financials.
///
/// Records whose statement type is not one of the three canonical labels are discarded.
/// When two batches report the same line item, the later one wins, for both current-year
/// items and individual historical years.
#[derive(Debug, Clone)]
pub struct StatementAssembler {
    financials: CanonicalFinancials,
    discarded: usize,
}

impl StatementAssembler {
    pub fn new(year: i32) -> Self {
        Self {
            financials: CanonicalFinancials::new(year),
            discarded: 0,
        }
    }

    pub fn absorb(&mut self, record: StatementRecord) {
        self.absorb_declared(record, None);
    }

    /// Like [`absorb`](Self::absorb), also noting the unit declared on the pages the record
    /// was read from. The first unit seen for a statement type is kept.
    pub fn absorb_declared(&mut self, record: StatementRecord, unit: Option<ReportingUnit>) {
        if record.is_empty() {
            return;
        }

        let Some(statement_type) = record.kind() else {
            warn!(
                "Discarding {} items under unrecognized statement type '{}'",
                record.data.len() + record.historical_data.len(),
                record.statement_type
            );
            self.discarded += 1;
            return;
        };

        debug!(
            "{}: {} current items, {} historical items",
            statement_type,
            record.data.len(),
            record.historical_data.len()
        );

        if let Some(unit) = unit {
            self.financials.units.entry(statement_type).or_insert(unit);
        }

        self.financials
            .statement_mut(statement_type)
            .extend(record.data);

        if !record.historical_data.is_empty() {
            let history = self
                .financials
                .historical
                .entry(statement_type)
                .or_default();
            for (item, years) in record.historical_data {
                history.entry(item).or_default().extend(years);
            }
        }
    }

    pub fn add_usage(&mut self, usage: TokenUsage) {
        self.financials.usage += usage;
    }

    /// Keeps the first unit any batch declared.
    pub fn observe_unit(&mut self, unit: Option<ReportingUnit>) {
        if self.financials.unit.is_none() {
            self.financials.unit = unit;
        }
    }

    /// Number of records dropped for an unrecognized statement type.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn finish(self) -> CanonicalFinancials {
        self.financials
    }
}

/// One-shot assembly of already collected records.
pub fn assemble<I>(year: i32, records: I) -> CanonicalFinancials
where
    I: IntoIterator<Item = StatementRecord>,
{
    let mut assembler = StatementAssembler::new(year);
    for record in records {
        assembler.absorb(record);
    }
    assembler.finish()
}
