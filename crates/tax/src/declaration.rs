//! Periodic IVA declaration: accumulators, settlement, carryover, freezing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use mozfiscal_core::money::round_money;
use mozfiscal_core::{AggregateId, DomainError, DomainResult, TenantId};

/// Declaration identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(pub AggregateId);

impl DeclarationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Direction a document contributes to: tax charged on sales, or tax borne
/// on purchases (deductible).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxOperation {
    Sales,
    Purchases,
}

/// IVA rate brackets of the Modelo A return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IvaBracket {
    /// Standard rate, 16%.
    Standard,
    /// Reduced rate, 5%.
    Reduced,
    /// Exempt / zero-rated supplies.
    Exempt,
}

impl IvaBracket {
    pub fn rate(&self) -> Decimal {
        match self {
            IvaBracket::Standard => Decimal::from(16),
            IvaBracket::Reduced => Decimal::from(5),
            IvaBracket::Exempt => Decimal::ZERO,
        }
    }

    /// Map a per-line rate onto its bracket. Unknown rates are a capture-time
    /// validation failure, not an aggregation-time one.
    pub fn from_rate(rate: Decimal) -> Option<Self> {
        if rate == Decimal::from(16) {
            Some(IvaBracket::Standard)
        } else if rate == Decimal::from(5) {
            Some(IvaBracket::Reduced)
        } else if rate.is_zero() {
            Some(IvaBracket::Exempt)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IvaBracket::Standard => "standard",
            IvaBracket::Reduced => "reduced",
            IvaBracket::Exempt => "exempt",
        }
    }
}

/// A declaration period: one calendar month of one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> DomainResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!(
                "month must be 1..=12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// The previous period; January looks at December of the prior year.
    pub fn prev(&self) -> Period {
        if self.month == 1 {
            Period {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Period {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // Month is validated at construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let next = if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        };
        next.first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }
}

impl core::fmt::Display for Period {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Named accumulators of the return, grouped by bracket and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeclarationAccumulators {
    pub sales_base_standard: Decimal,
    pub sales_tax_standard: Decimal,
    pub sales_base_reduced: Decimal,
    pub sales_tax_reduced: Decimal,
    pub sales_base_exempt: Decimal,

    pub purchases_base_standard: Decimal,
    pub purchases_tax_standard: Decimal,
    pub purchases_base_reduced: Decimal,
    pub purchases_tax_reduced: Decimal,
    pub purchases_base_exempt: Decimal,
}

impl DeclarationAccumulators {
    /// Fold one line contribution in. Credit notes pass negative amounts.
    pub fn add(&mut self, operation: TaxOperation, bracket: IvaBracket, base: Decimal, tax: Decimal) {
        match (operation, bracket) {
            (TaxOperation::Sales, IvaBracket::Standard) => {
                self.sales_base_standard += base;
                self.sales_tax_standard += tax;
            }
            (TaxOperation::Sales, IvaBracket::Reduced) => {
                self.sales_base_reduced += base;
                self.sales_tax_reduced += tax;
            }
            (TaxOperation::Sales, IvaBracket::Exempt) => {
                self.sales_base_exempt += base;
            }
            (TaxOperation::Purchases, IvaBracket::Standard) => {
                self.purchases_base_standard += base;
                self.purchases_tax_standard += tax;
            }
            (TaxOperation::Purchases, IvaBracket::Reduced) => {
                self.purchases_base_reduced += base;
                self.purchases_tax_reduced += tax;
            }
            (TaxOperation::Purchases, IvaBracket::Exempt) => {
                self.purchases_base_exempt += base;
            }
        }
    }

    /// Round every accumulator to persisted money precision.
    pub fn rounded(&self) -> Self {
        Self {
            sales_base_standard: round_money(self.sales_base_standard),
            sales_tax_standard: round_money(self.sales_tax_standard),
            sales_base_reduced: round_money(self.sales_base_reduced),
            sales_tax_reduced: round_money(self.sales_tax_reduced),
            sales_base_exempt: round_money(self.sales_base_exempt),
            purchases_base_standard: round_money(self.purchases_base_standard),
            purchases_tax_standard: round_money(self.purchases_tax_standard),
            purchases_base_reduced: round_money(self.purchases_base_reduced),
            purchases_tax_reduced: round_money(self.purchases_tax_reduced),
            purchases_base_exempt: round_money(self.purchases_base_exempt),
        }
    }

    pub fn tax_due(&self) -> Decimal {
        self.sales_tax_standard + self.sales_tax_reduced
    }

    pub fn tax_deductible(&self) -> Decimal {
        self.purchases_tax_standard + self.purchases_tax_reduced
    }
}

/// Settlement of one period against the prior period's carried credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settlement {
    pub tax_due: Decimal,
    pub tax_deductible: Decimal,
    pub net_difference: Decimal,
    pub prior_credit: Decimal,
    pub tax_payable: Decimal,
    pub credit_carried_forward: Decimal,
}

impl Settlement {
    /// `net = due - deductible`; a positive net is offset against the prior
    /// credit, a negative net adds to it.
    pub fn compute(tax_due: Decimal, tax_deductible: Decimal, prior_credit: Decimal) -> Self {
        let net_difference = tax_due - tax_deductible;

        let (tax_payable, credit_carried_forward) = if net_difference > Decimal::ZERO {
            (
                (net_difference - prior_credit).max(Decimal::ZERO),
                (prior_credit - net_difference).max(Decimal::ZERO),
            )
        } else {
            (Decimal::ZERO, net_difference.abs() + prior_credit)
        };

        Self {
            tax_due,
            tax_deductible,
            net_difference,
            prior_credit,
            tax_payable,
            credit_carried_forward,
        }
    }
}

/// Submission lifecycle of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationState {
    Draft,
    Validated,
    Submitted,
    Accepted,
}

impl DeclarationState {
    /// Once submitted the row is append-then-freeze: no recomputation.
    pub fn is_frozen(&self) -> bool {
        matches!(self, DeclarationState::Submitted | DeclarationState::Accepted)
    }
}

/// One tenant-month IVA return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxDeclaration {
    pub id: DeclarationId,
    pub tenant_id: TenantId,
    pub period: Period,
    pub accumulators: DeclarationAccumulators,
    pub settlement: Settlement,
    pub state: DeclarationState,
    pub confirmation_code: Option<String>,
    pub document_count: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl TaxDeclaration {
    /// Replace accumulators/settlement with a fresh aggregation pass.
    ///
    /// Only legal while the declaration is not frozen; the caller passes the
    /// rounded accumulators and the prior period's carried credit.
    pub fn regenerate(
        &mut self,
        accumulators: DeclarationAccumulators,
        prior_credit: Decimal,
        document_count: usize,
        generated_at: chrono::DateTime<chrono::Utc>,
    ) -> DomainResult<()> {
        if self.state.is_frozen() {
            return Err(DomainError::state_conflict(format!(
                "declaration {} for {} is already submitted",
                self.id, self.period
            )));
        }

        let rounded = accumulators.rounded();
        self.settlement =
            Settlement::compute(rounded.tax_due(), rounded.tax_deductible(), prior_credit);
        self.accumulators = rounded;
        self.document_count = document_count;
        self.generated_at = generated_at;
        self.state = DeclarationState::Draft;
        Ok(())
    }

    /// Draft -> Validated (pre-submission review step).
    pub fn validate(&mut self) -> DomainResult<()> {
        match self.state {
            DeclarationState::Draft => {
                self.state = DeclarationState::Validated;
                Ok(())
            }
            other => Err(DomainError::state_conflict(format!(
                "declaration {} cannot be validated from {other:?}",
                self.id
            ))),
        }
    }

    /// Freeze the declaration and assign its confirmation code.
    pub fn submit(&mut self) -> DomainResult<String> {
        if self.state.is_frozen() {
            return Err(DomainError::state_conflict(format!(
                "declaration {} for {} is already submitted",
                self.id, self.period
            )));
        }

        let code = self.confirmation_code_value();
        self.confirmation_code = Some(code.clone());
        self.state = DeclarationState::Submitted;
        Ok(code)
    }

    /// Opaque but reproducible confirmation code over the frozen figures.
    fn confirmation_code_value(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.tenant_id.to_string().as_bytes());
        hasher.update(self.period.to_string().as_bytes());
        hasher.update(self.settlement.tax_payable.to_string().as_bytes());
        hasher.update(
            self.settlement
                .credit_carried_forward
                .to_string()
                .as_bytes(),
        );
        let digest = hasher.finalize();
        let hex: String = digest.iter().take(8).map(|b| format!("{b:02X}")).collect();
        format!("AT-{hex}")
    }
}
