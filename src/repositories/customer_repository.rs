//! Repositorio de clientes

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::models::Customer;
use crate::utils::errors::AppResult;

#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
}

pub struct CustomerRepository;

impl CustomerRepository {
    pub async fn insert(conn: &mut PgConnection, customer: NewCustomer) -> AppResult<Customer> {
        let row = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (first_name, last_name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(customer.first_name)
        .bind(customer.last_name)
        .bind(customer.email)
        .bind(customer.phone)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(customer)
    }

    pub async fn find_by_id_for_update(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> AppResult<Option<Customer>> {
        let customer =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(customer)
    }

    /// Acumula estadísticas del cliente al entregar una reserva.
    pub async fn increment_delivered_stats(
        conn: &mut PgConnection,
        id: Uuid,
        spent: Decimal,
    ) -> AppResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET total_bookings = total_bookings + 1,
                total_spent = total_spent + $2,
                updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(spent)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;

        Ok(customer)
    }
}
