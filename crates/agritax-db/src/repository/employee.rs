//! # Employee Repository
//!
//! Worker records and the monthly gross figures payroll hands over.
//! The PIT calculator only reads these; payroll itself lives elsewhere.

use agritax_core::validation::validate_required;
use agritax_core::{ContractType, CoreError, Employee, PayrollEntry, Period, PeriodType, Residency};
use sqlx::SqlitePool;
use tracing::debug;

use crate::codec::{decode_count, decode_money, decode_opt_money, decode_period, encode_money, encode_opt_money};
use crate::error::{DbError, DbResult};

const COLUMNS: &str =
    "id, farm_id, full_name, tax_code, residency, contract_type, dependents_count, insurance_base, is_active";

#[derive(Debug, sqlx::FromRow)]
struct EmployeeRow {
    id: String,
    farm_id: String,
    full_name: String,
    tax_code: Option<String>,
    residency: Residency,
    contract_type: ContractType,
    dependents_count: i64,
    insurance_base: Option<String>,
    is_active: bool,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = DbError;

    fn try_from(row: EmployeeRow) -> DbResult<Self> {
        Ok(Employee {
            dependents_count: decode_count("employees.dependents_count", row.dependents_count)?,
            insurance_base: decode_opt_money("employees.insurance_base", row.insurance_base.as_deref())?,
            id: row.id,
            farm_id: row.farm_id,
            full_name: row.full_name,
            tax_code: row.tax_code,
            residency: row.residency,
            contract_type: row.contract_type,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayrollRow {
    farm_id: String,
    employee_id: String,
    period: String,
    gross_income: String,
    dependents_count: Option<i64>,
    other_deduction: Option<String>,
    insurance_deduction: Option<String>,
}

impl TryFrom<PayrollRow> for PayrollEntry {
    type Error = DbError;

    fn try_from(row: PayrollRow) -> DbResult<Self> {
        Ok(PayrollEntry {
            period: decode_period("payroll_entries.period", &row.period)?,
            gross_income: decode_money("payroll_entries.gross_income", &row.gross_income)?,
            dependents_count: row
                .dependents_count
                .map(|n| decode_count("payroll_entries.dependents_count", n))
                .transpose()?,
            other_deduction: decode_opt_money("payroll_entries.other_deduction", row.other_deduction.as_deref())?,
            insurance_deduction: decode_opt_money(
                "payroll_entries.insurance_deduction",
                row.insurance_deduction.as_deref(),
            )?,
            farm_id: row.farm_id,
            employee_id: row.employee_id,
        })
    }
}

/// Repository for employees and payroll entries.
#[derive(Debug, Clone)]
pub struct EmployeeRepository {
    pool: SqlitePool,
}

impl EmployeeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EmployeeRepository { pool }
    }

    pub async fn insert(&self, employee: &Employee) -> DbResult<()> {
        validate_required("employee.id", &employee.id).map_err(CoreError::from)?;
        validate_required("employee.full_name", &employee.full_name).map_err(CoreError::from)?;

        debug!(farm_id = %employee.farm_id, employee_id = %employee.id, "Inserting employee");

        sqlx::query(
            "INSERT INTO employees (id, farm_id, full_name, tax_code, residency, contract_type, \
                 dependents_count, insurance_base, is_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&employee.id)
        .bind(&employee.farm_id)
        .bind(&employee.full_name)
        .bind(&employee.tax_code)
        .bind(employee.residency)
        .bind(employee.contract_type)
        .bind(i64::from(employee.dependents_count))
        .bind(encode_opt_money(employee.insurance_base))
        .bind(employee.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an employee of this farm. Another farm's employee is `None`.
    pub async fn get(&self, farm_id: &str, employee_id: &str) -> DbResult<Option<Employee>> {
        let query = format!("SELECT {COLUMNS} FROM employees WHERE id = ?1 AND farm_id = ?2");
        let row: Option<EmployeeRow> = sqlx::query_as(&query)
            .bind(employee_id)
            .bind(farm_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Employee::try_from).transpose()
    }

    pub async fn list_active(&self, farm_id: &str) -> DbResult<Vec<Employee>> {
        let query = format!(
            "SELECT {COLUMNS} FROM employees WHERE farm_id = ?1 AND is_active = 1 ORDER BY full_name, id"
        );
        let rows: Vec<EmployeeRow> = sqlx::query_as(&query)
            .bind(farm_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Employee::try_from).collect()
    }

    // =========================================================================
    // Payroll
    // =========================================================================

    /// Records (or replaces) an employee's gross figure for a month.
    pub async fn upsert_payroll(&self, entry: &PayrollEntry) -> DbResult<()> {
        entry
            .period
            .expect_type(PeriodType::Monthly)
            .map_err(CoreError::from)?;

        sqlx::query(
            "INSERT INTO payroll_entries (farm_id, employee_id, period, gross_income, \
                 dependents_count, other_deduction, insurance_deduction) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (farm_id, employee_id, period) DO UPDATE SET \
                 gross_income = excluded.gross_income, \
                 dependents_count = excluded.dependents_count, \
                 other_deduction = excluded.other_deduction, \
                 insurance_deduction = excluded.insurance_deduction",
        )
        .bind(&entry.farm_id)
        .bind(&entry.employee_id)
        .bind(entry.period.to_string())
        .bind(encode_money(entry.gross_income))
        .bind(entry.dependents_count.map(i64::from))
        .bind(encode_opt_money(entry.other_deduction))
        .bind(encode_opt_money(entry.insurance_deduction))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All payroll entries of a month, in employee order.
    pub async fn payroll_for(&self, farm_id: &str, period: Period) -> DbResult<Vec<PayrollEntry>> {
        let rows: Vec<PayrollRow> = sqlx::query_as(
            "SELECT farm_id, employee_id, period, gross_income, dependents_count, \
                    other_deduction, insurance_deduction \
             FROM payroll_entries WHERE farm_id = ?1 AND period = ?2 ORDER BY employee_id",
        )
        .bind(farm_id)
        .bind(period.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PayrollEntry::try_from).collect()
    }
}
