use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AggregateRoot, DomainError, DomainResult, ProductId, PurchaseOrderId, SupplierId, UserId,
    WarehouseId,
};

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    Approved,
    Received,
    Cancelled,
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Submitted => "SUBMITTED",
            PurchaseOrderStatus::Approved => "APPROVED",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Requested line on a purchase order (caller input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Decimal,
    /// Percent (e.g. `8.25`). Informational; not part of the order total.
    #[serde(default)]
    pub tax_rate: Decimal,
    /// Absolute discount for the whole line.
    #[serde(default)]
    pub discount_amount: Decimal,
}

impl PurchaseOrderLine {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            tax_rate: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
        }
    }

    fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.unit_price.is_sign_negative() {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        if self.tax_rate.is_sign_negative() {
            return Err(DomainError::validation("tax_rate cannot be negative"));
        }
        if self.discount_amount.is_sign_negative() {
            return Err(DomainError::validation("discount_amount cannot be negative"));
        }
        let gross = gross_amount(self.unit_price, self.quantity)?;
        if self.discount_amount > gross {
            return Err(DomainError::validation(
                "discount_amount exceeds the line amount",
            ));
        }
        Ok(())
    }
}

/// Purchase order line item, owned by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub quantity_received: i64,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount_amount: Decimal,
}

impl PurchaseOrderItem {
    /// `unit_price * quantity_ordered - discount_amount`.
    pub fn line_total(&self) -> DomainResult<Decimal> {
        gross_amount(self.unit_price, self.quantity_ordered)?
            .checked_sub(self.discount_amount)
            .ok_or_else(amount_overflow)
    }

    pub fn line_tax(&self) -> DomainResult<Decimal> {
        self.line_total()?
            .checked_mul(self.tax_rate)
            .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(amount_overflow)
    }
}

/// Header fields supplied when creating or updating a purchase order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderDraft {
    pub expected_delivery_date: Option<NaiveDate>,
    pub shipping_cost: Decimal,
    pub notes: Option<String>,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    po_number: String,
    supplier_id: SupplierId,
    warehouse_id: WarehouseId,
    order_date: NaiveDate,
    expected_delivery_date: Option<NaiveDate>,
    actual_delivery_date: Option<NaiveDate>,
    status: PurchaseOrderStatus,
    total_amount: Decimal,
    tax_amount: Decimal,
    shipping_cost: Decimal,
    notes: Option<String>,
    created_by: UserId,
    approved_by: Option<UserId>,
    items: Vec<PurchaseOrderItem>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PurchaseOrder {
    /// Create a new order in DRAFT.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: PurchaseOrderId,
        po_number: impl Into<String>,
        supplier_id: SupplierId,
        warehouse_id: WarehouseId,
        header: PurchaseOrderDraft,
        lines: &[PurchaseOrderLine],
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let po_number = po_number.into();
        if po_number.trim().is_empty() {
            return Err(DomainError::validation("po_number cannot be empty"));
        }
        if header.shipping_cost.is_sign_negative() {
            return Err(DomainError::validation("shipping_cost cannot be negative"));
        }
        let items = build_items(lines)?;
        let (total_amount, tax_amount) = totals(&items)?;

        Ok(Self {
            id,
            po_number,
            supplier_id,
            warehouse_id,
            order_date: now.date_naive(),
            expected_delivery_date: header.expected_delivery_date,
            actual_delivery_date: None,
            status: PurchaseOrderStatus::Draft,
            total_amount,
            tax_amount,
            shipping_cost: header.shipping_cost,
            notes: header.notes,
            created_by,
            approved_by: None,
            items,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn po_number(&self) -> &str {
        &self.po_number
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn expected_delivery_date(&self) -> Option<NaiveDate> {
        self.expected_delivery_date
    }

    pub fn actual_delivery_date(&self) -> Option<NaiveDate> {
        self.actual_delivery_date
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    /// Sum of line totals. Tax and shipping are tracked separately and are
    /// not part of this amount.
    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn tax_amount(&self) -> Decimal {
        self.tax_amount
    }

    pub fn shipping_cost(&self) -> Decimal {
        self.shipping_cost
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, PurchaseOrderStatus::Draft)
    }

    /// Awaiting goods: submitted or approved.
    pub fn is_pending(&self) -> bool {
        matches!(
            self.status,
            PurchaseOrderStatus::Submitted | PurchaseOrderStatus::Approved
        )
    }

    /// Record the version assigned by the store after a successful commit.
    pub fn mark_persisted(&mut self, version: u64) {
        self.version = version;
    }

    /// Replace every item and the header fields (DRAFT only).
    pub fn replace_items(
        &mut self,
        header: PurchaseOrderDraft,
        lines: &[PurchaseOrderLine],
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if !self.is_modifiable() {
            return Err(DomainError::invalid_state(format!(
                "can only update purchase orders in DRAFT status (order {} is {})",
                self.po_number, self.status
            )));
        }
        if header.shipping_cost.is_sign_negative() {
            return Err(DomainError::validation("shipping_cost cannot be negative"));
        }
        let items = build_items(lines)?;
        let (total_amount, tax_amount) = totals(&items)?;

        self.items = items;
        self.total_amount = total_amount;
        self.tax_amount = tax_amount;
        self.expected_delivery_date = header.expected_delivery_date;
        self.shipping_cost = header.shipping_cost;
        self.notes = header.notes;
        self.updated_at = now;
        Ok(())
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "can only submit DRAFT purchase orders (order {} is {})",
                self.po_number, self.status
            )));
        }
        self.status = PurchaseOrderStatus::Submitted;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, approver: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if !matches!(
            self.status,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Submitted
        ) {
            return Err(DomainError::invalid_state(format!(
                "can only approve DRAFT or SUBMITTED purchase orders (order {} is {})",
                self.po_number, self.status
            )));
        }
        self.status = PurchaseOrderStatus::Approved;
        self.approved_by = Some(approver);
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_receivable(&self) -> DomainResult<()> {
        if self.status != PurchaseOrderStatus::Approved {
            return Err(DomainError::invalid_state(format!(
                "can only receive APPROVED purchase orders (order {} is {})",
                self.po_number, self.status
            )));
        }
        Ok(())
    }

    /// Mark every item fully received. Partial receipt is not supported.
    pub fn mark_received(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_receivable()?;
        for item in &mut self.items {
            item.quantity_received = item.quantity_ordered;
        }
        self.status = PurchaseOrderStatus::Received;
        self.actual_delivery_date = Some(now.date_naive());
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            PurchaseOrderStatus::Received => Err(DomainError::invalid_state(format!(
                "cannot cancel received purchase order {}",
                self.po_number
            ))),
            PurchaseOrderStatus::Cancelled => Err(DomainError::invalid_state(format!(
                "purchase order {} is already cancelled",
                self.po_number
            ))),
            _ => {
                self.status = PurchaseOrderStatus::Cancelled;
                self.updated_at = now;
                Ok(())
            }
        }
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status == PurchaseOrderStatus::Received {
            return Err(DomainError::invalid_state(format!(
                "cannot delete received purchase order {}",
                self.po_number
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

fn amount_overflow() -> DomainError {
    DomainError::validation("amount overflow")
}

fn gross_amount(unit_price: Decimal, quantity: i64) -> DomainResult<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(amount_overflow)
}

/// `(total_amount, tax_amount)` over all items.
fn totals(items: &[PurchaseOrderItem]) -> DomainResult<(Decimal, Decimal)> {
    items
        .iter()
        .try_fold((Decimal::ZERO, Decimal::ZERO), |(total, tax), item| {
            let total = total
                .checked_add(item.line_total()?)
                .ok_or_else(amount_overflow)?;
            let tax = tax.checked_add(item.line_tax()?).ok_or_else(amount_overflow)?;
            Ok((total, tax))
        })
}

fn build_items(lines: &[PurchaseOrderLine]) -> DomainResult<Vec<PurchaseOrderItem>> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "purchase order must have at least one item",
        ));
    }
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            line.validate()?;
            Ok(PurchaseOrderItem {
                line_no: idx as u32 + 1,
                product_id: line.product_id,
                quantity_ordered: line.quantity,
                quantity_received: 0,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                discount_amount: line.discount_amount,
            })
        })
        .collect()
}
