use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{
    AggregateRoot, CustomerId, DomainError, DomainResult, ProductId, SalesOrderId, UserId,
    WarehouseId,
};

/// Sales order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesOrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl core::fmt::Display for SalesOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SalesOrderStatus::Pending => "PENDING",
            SalesOrderStatus::Confirmed => "CONFIRMED",
            SalesOrderStatus::Shipped => "SHIPPED",
            SalesOrderStatus::Delivered => "DELIVERED",
            SalesOrderStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

/// Requested line on a sales order (caller input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Decimal,
    /// Percent, applied to the discounted line total.
    #[serde(default)]
    pub tax_rate: Decimal,
    /// Percent off `unit_price * quantity`, in `[0, 100]`.
    #[serde(default)]
    pub discount_percent: Decimal,
}

impl SalesOrderLine {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            tax_rate: Decimal::ZERO,
            discount_percent: Decimal::ZERO,
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
        if self.discount_percent.is_sign_negative() || self.discount_percent > Decimal::ONE_HUNDRED
        {
            return Err(DomainError::validation(
                "discount_percent must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Sales order line item, owned by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount_percent: Decimal,
}

impl SalesOrderItem {
    /// `unit_price * quantity` less `discount_percent` of that amount.
    pub fn line_total(&self) -> DomainResult<Decimal> {
        let gross = self
            .unit_price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(amount_overflow)?;
        let discount = percent_of(gross, self.discount_percent)?;
        gross.checked_sub(discount).ok_or_else(amount_overflow)
    }

    pub fn line_tax(&self) -> DomainResult<Decimal> {
        percent_of(self.line_total()?, self.tax_rate)
    }
}

/// Monetary summary of a sales order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

impl SalesTotals {
    /// `total = subtotal + tax - discount`; a discount larger than the
    /// pre-discount amount is rejected.
    pub fn compute(items: &[SalesOrderItem], discount_amount: Decimal) -> DomainResult<Self> {
        if discount_amount.is_sign_negative() {
            return Err(DomainError::validation("discount_amount cannot be negative"));
        }
        let subtotal = checked_sum(items.iter().map(SalesOrderItem::line_total))?;
        let tax_amount = checked_sum(items.iter().map(SalesOrderItem::line_tax))?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .and_then(|gross| gross.checked_sub(discount_amount))
            .ok_or_else(amount_overflow)?;
        if total_amount.is_sign_negative() {
            return Err(DomainError::validation(
                "discount_amount exceeds the order amount",
            ));
        }
        Ok(Self {
            subtotal,
            tax_amount,
            discount_amount,
            total_amount,
        })
    }
}

/// Header fields supplied when creating or updating a sales order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrderDraft {
    pub discount_amount: Decimal,
    pub payment_method: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Aggregate root: SalesOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesOrder {
    id: SalesOrderId,
    so_number: String,
    customer_id: CustomerId,
    warehouse_id: WarehouseId,
    order_date: NaiveDate,
    delivery_date: Option<NaiveDate>,
    status: SalesOrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<String>,
    totals: SalesTotals,
    notes: Option<String>,
    created_by: UserId,
    items: Vec<SalesOrderItem>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SalesOrder {
    /// Create a new order in PENDING. Reserving its stock is the caller's job.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: SalesOrderId,
        so_number: impl Into<String>,
        customer_id: CustomerId,
        warehouse_id: WarehouseId,
        header: SalesOrderDraft,
        lines: &[SalesOrderLine],
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let so_number = so_number.into();
        if so_number.trim().is_empty() {
            return Err(DomainError::validation("so_number cannot be empty"));
        }
        let items = build_items(lines)?;
        let totals = SalesTotals::compute(&items, header.discount_amount)?;

        Ok(Self {
            id,
            so_number,
            customer_id,
            warehouse_id,
            order_date: now.date_naive(),
            delivery_date: header.delivery_date,
            status: SalesOrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_method: header.payment_method,
            totals,
            notes: header.notes,
            created_by,
            items,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn order_id(&self) -> SalesOrderId {
        self.id
    }

    pub fn so_number(&self) -> &str {
        &self.so_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    pub fn status(&self) -> SalesOrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    pub fn totals(&self) -> SalesTotals {
        self.totals
    }

    pub fn total_amount(&self) -> Decimal {
        self.totals.total_amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> UserId {
        self.created_by
    }

    pub fn items(&self) -> &[SalesOrderItem] {
        &self.items
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// PENDING and CONFIRMED orders hold reservations for all of their items.
    pub fn holds_reservations(&self) -> bool {
        matches!(
            self.status,
            SalesOrderStatus::Pending | SalesOrderStatus::Confirmed
        )
    }

    /// Quantity per product, with lines for the same product accumulated.
    pub fn quantities_by_product(&self) -> DomainResult<BTreeMap<ProductId, i64>> {
        quantities_by_product(&self.items)
    }

    /// Record the version assigned by the store after a successful commit.
    pub fn mark_persisted(&mut self, version: u64) {
        self.version = version;
    }

    /// Replace every item and the header fields (PENDING only).
    ///
    /// Releasing the old reservations and reserving the new ones is the
    /// caller's job.
    pub fn replace_items(
        &mut self,
        header: SalesOrderDraft,
        lines: &[SalesOrderLine],
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "can only update sales orders in PENDING status (order {} is {})",
                self.so_number, self.status
            )));
        }
        let items = build_items(lines)?;
        let totals = SalesTotals::compute(&items, header.discount_amount)?;

        self.items = items;
        self.totals = totals;
        self.payment_method = header.payment_method;
        self.delivery_date = header.delivery_date;
        self.notes = header.notes;
        self.updated_at = now;
        Ok(())
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "can only confirm PENDING sales orders (order {} is {})",
                self.so_number, self.status
            )));
        }
        self.status = SalesOrderStatus::Confirmed;
        self.updated_at = now;
        Ok(())
    }

    pub fn ensure_shippable(&self) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Confirmed {
            return Err(DomainError::invalid_state(format!(
                "can only ship CONFIRMED sales orders (order {} is {})",
                self.so_number, self.status
            )));
        }
        Ok(())
    }

    /// Whole-order shipment; partial shipment is not supported.
    pub fn mark_shipped(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_shippable()?;
        self.status = SalesOrderStatus::Shipped;
        self.updated_at = now;
        Ok(())
    }

    pub fn deliver(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != SalesOrderStatus::Shipped {
            return Err(DomainError::invalid_state(format!(
                "can only deliver SHIPPED sales orders (order {} is {})",
                self.so_number, self.status
            )));
        }
        self.status = SalesOrderStatus::Delivered;
        self.delivery_date = Some(now.date_naive());
        self.updated_at = now;
        Ok(())
    }

    /// Cancel the order. Check `holds_reservations` first to decide whether
    /// stock must be released.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            SalesOrderStatus::Delivered => Err(DomainError::invalid_state(format!(
                "cannot cancel delivered sales order {}",
                self.so_number
            ))),
            SalesOrderStatus::Cancelled => Err(DomainError::invalid_state(format!(
                "sales order {} is already cancelled",
                self.so_number
            ))),
            _ => {
                self.status = SalesOrderStatus::Cancelled;
                self.updated_at = now;
                Ok(())
            }
        }
    }

    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.status == SalesOrderStatus::Delivered {
            return Err(DomainError::invalid_state(format!(
                "cannot delete delivered sales order {}",
                self.so_number
            )));
        }
        Ok(())
    }

    pub fn record_payment(
        &mut self,
        payment_status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status == SalesOrderStatus::Cancelled {
            return Err(DomainError::invalid_state(format!(
                "cannot record payment on cancelled sales order {}",
                self.so_number
            )));
        }
        self.payment_status = payment_status;
        self.updated_at = now;
        Ok(())
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Accumulate requested quantity per product.
pub fn quantities_by_product(
    items: &[SalesOrderItem],
) -> DomainResult<BTreeMap<ProductId, i64>> {
    let mut totals = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.product_id).or_insert(0i64);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            DomainError::validation(format!("quantity overflow for product {}", item.product_id))
        })?;
    }
    Ok(totals)
}

fn amount_overflow() -> DomainError {
    DomainError::validation("amount overflow")
}

fn percent_of(amount: Decimal, percent: Decimal) -> DomainResult<Decimal> {
    amount
        .checked_mul(percent)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(amount_overflow)
}

fn checked_sum<I>(mut amounts: I) -> DomainResult<Decimal>
where
    I: Iterator<Item = DomainResult<Decimal>>,
{
    amounts.try_fold(Decimal::ZERO, |acc, amount| {
        acc.checked_add(amount?).ok_or_else(amount_overflow)
    })
}

fn build_items(lines: &[SalesOrderLine]) -> DomainResult<Vec<SalesOrderItem>> {
    if lines.is_empty() {
        return Err(DomainError::validation(
            "sales order must have at least one item",
        ));
    }
    let items = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            line.validate()?;
            Ok(SalesOrderItem {
                line_no: idx as u32 + 1,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                tax_rate: line.tax_rate,
                discount_percent: line.discount_percent,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;
    quantities_by_product(&items)?;
    Ok(items)
}
