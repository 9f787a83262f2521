//! The statements a simulated user runs, and the random data they bind.

use chrono::{Duration as ChronoDuration, Utc};
use pg_session::{Connector, QueryOutcome, RowValues, Session, SessionError};
use rand::Rng;
use rand::distr::Alphanumeric;
use rand_chacha::ChaCha8Rng;

pub(crate) const SCHEMA: [&str; 4] = [
    "CREATE SCHEMA IF NOT EXISTS public",
    "CREATE TABLE IF NOT EXISTS public.users (
        user_id SERIAL PRIMARY KEY,
        name VARCHAR(100),
        location VARCHAR(100),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS public.orders (
        order_id SERIAL PRIMARY KEY,
        user_id INT REFERENCES public.users(user_id),
        order_date DATE,
        total_amount NUMERIC(10,2)
    )",
    "CREATE TABLE IF NOT EXISTS public.order_items (
        item_id SERIAL PRIMARY KEY,
        order_id INT REFERENCES public.orders(order_id),
        product_name VARCHAR(100),
        quantity INT,
        price NUMERIC(10,2)
    )",
];

const INSERT_USER: &str = "INSERT INTO public.users (name, location) VALUES (%s, %s)";

const SELECT_SIMPLE: &str = "SELECT user_id, name, location, created_at
    FROM public.users
    WHERE user_id < %s";

const SELECT_WITH_JOIN: &str =
    "SELECT u.user_id, u.name, o.order_id, o.order_date, oi.product_name, oi.quantity
    FROM public.users u
    JOIN public.orders o ON u.user_id = o.user_id
    JOIN public.order_items oi ON o.order_id = oi.order_id
    WHERE o.total_amount > %s
    ORDER BY u.user_id
    LIMIT %s";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    WriteData,
    ReadSimple,
    ReadWithJoin,
}

impl Task {
    const WEIGHTED: [(Task, u32); 3] = [
        (Task::WriteData, 2),
        (Task::ReadSimple, 3),
        (Task::ReadWithJoin, 1),
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Task::WriteData => "write_data",
            Task::ReadSimple => "read_simple",
            Task::ReadWithJoin => "read_with_join",
        }
    }

    pub(crate) fn pick(rng: &mut ChaCha8Rng) -> Task {
        let total: u32 = Self::WEIGHTED.iter().map(|(_, w)| w).sum();
        let mut roll = rng.random_range(0..total);
        for (task, weight) in Self::WEIGHTED {
            if roll < weight {
                return task;
            }
            roll -= weight;
        }
        Task::ReadSimple
    }

    /// Run the task's statement, returning what the session reported.
    pub(crate) async fn run<C: Connector>(
        self,
        session: &mut Session<C>,
        rng: &mut ChaCha8Rng,
    ) -> Result<QueryOutcome, SessionError> {
        match self {
            Task::WriteData => {
                let params = [
                    RowValues::Text(random_text(rng, 8)),
                    RowValues::Text(random_text(rng, 5)),
                ];
                session.execute(INSERT_USER, &params).await
            }
            Task::ReadSimple => session.execute(SELECT_SIMPLE, &[RowValues::Int(5)]).await,
            Task::ReadWithJoin => {
                session
                    .execute(SELECT_WITH_JOIN, &[RowValues::Int(50), RowValues::Int(10)])
                    .await
            }
        }
    }
}

pub(crate) fn random_text(rng: &mut ChaCha8Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect()
}

/// Create the tables a run needs. Failures are returned but the run carries on.
pub(crate) async fn create_schema<C: Connector>(
    session: &mut Session<C>,
) -> Result<(), SessionError> {
    for ddl in SCHEMA {
        let outcome = session.execute(ddl, &[]).await?;
        if let Some(reason) = outcome.failure {
            tracing::error!("schema setup failed: {reason}");
            break;
        }
    }
    tracing::info!("create schema finished");
    Ok(())
}

/// Insert ten users, a few orders each, and a few items per order.
pub(crate) async fn seed_data<C: Connector>(
    session: &mut Session<C>,
    rng: &mut ChaCha8Rng,
) -> Result<(), SessionError> {
    let count = session
        .execute("SELECT COUNT(*) AS n FROM public.users", &[])
        .await?;
    let existing = count
        .rows
        .results
        .first()
        .and_then(|row| row.get("n"))
        .and_then(RowValues::as_int)
        .copied()
        .unwrap_or(0);
    if existing > 0 {
        return Ok(());
    }

    for _ in 0..10 {
        let params = [
            RowValues::Text(random_text(rng, 8)),
            RowValues::Text(random_text(rng, 5)),
        ];
        session.execute(INSERT_USER, &params).await?;
    }

    let users = session
        .execute(
            "SELECT user_id FROM public.users ORDER BY user_id LIMIT 10",
            &[],
        )
        .await?;
    for user in &users.rows {
        let Some(user_id) = user.get("user_id").and_then(RowValues::as_int).copied() else {
            continue;
        };
        for _ in 0..rng.random_range(1_u32..=3) {
            let days_ago = rng.random_range(0_i64..=30);
            let order_date = (Utc::now() - ChronoDuration::days(days_ago)).naive_utc();
            let total = f64::from(rng.random_range(1_000_u32..=20_000)) / 100.0;
            let order = session
                .execute(
                    "INSERT INTO public.orders (user_id, order_date, total_amount)
                     VALUES (%s, %s, %s) RETURNING order_id",
                    &[
                        RowValues::Int(user_id),
                        RowValues::Timestamp(order_date),
                        RowValues::Float(total),
                    ],
                )
                .await?;
            let Some(order_id) = order
                .rows
                .results
                .first()
                .and_then(|row| row.get("order_id"))
                .and_then(RowValues::as_int)
                .copied()
            else {
                continue;
            };
            for _ in 0..rng.random_range(1_u32..=5) {
                let price = f64::from(rng.random_range(100_u32..=5_000)) / 100.0;
                session
                    .execute(
                        "INSERT INTO public.order_items (order_id, product_name, quantity, price)
                         VALUES (%s, %s, %s, %s)",
                        &[
                            RowValues::Int(order_id),
                            RowValues::Text(random_text(rng, 6)),
                            RowValues::Int(rng.random_range(1_i64..=5)),
                            RowValues::Float(price),
                        ],
                    )
                    .await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn task_mix_follows_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut counts = [0u32; 3];
        for _ in 0..6_000 {
            match Task::pick(&mut rng) {
                Task::WriteData => counts[0] += 1,
                Task::ReadSimple => counts[1] += 1,
                Task::ReadWithJoin => counts[2] += 1,
            }
        }
        assert!(counts[1] > counts[0] && counts[0] > counts[2]);
    }

    #[test]
    fn random_text_is_seeded() {
        let a = random_text(&mut ChaCha8Rng::seed_from_u64(1), 8);
        let b = random_text(&mut ChaCha8Rng::seed_from_u64(1), 8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }
}
