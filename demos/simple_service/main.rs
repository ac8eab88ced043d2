//! Simple Service Example
//!
//! Wires two entity services over in-memory stores and walks through the
//! full lifecycle: create, list with filters and redaction, populate a
//! relation, update, delete, and issue/verify a token.
//!
//! ```sh
//! JWT_SECRET=dev JWT_EXPIRE=15m RUST_LOG=info cargo run --example simple_service
//! ```

use anyhow::Result;
use docbase::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Customer {
    name: String,
    email: String,
    password: String,
    tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    reference: String,
    amount: f64,
    customer: u64,
}

fn customer(name: &str, tier: &str) -> Customer {
    Customer {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        password: "hunter2".to_string(),
        tier: tier.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    let operator = ActingUser::new("operator".to_string()).with_attribute("role", "support");

    let customers = EntityService::<Customer, _>::builder(InMemoryStore::new("customers"))
        .sensitive_fields(["-password"])
        .validator(
            FieldRules::new()
                .field("name", validators::required())
                .field("email", validators::email())
                .field(
                    "tier",
                    validators::in_list(vec!["free".to_string(), "pro".to_string()]),
                ),
        )
        .config(config.clone())
        .build()?;

    let orders = EntityService::<Order, _>::builder(
        InMemoryStore::new("orders").with_relation("customer", customers.store().clone()),
    )
    .validator(validators_for_orders())
    .config(config)
    .build()?;

    // === Create ===
    let ada = customers.create(Some(&operator), &customer("Ada", "pro")).await?;
    let grace = customers.create(Some(&operator), &customer("Grace", "free")).await?;
    println!("Created customers {} and {}", ada.id, grace.id);

    if let Err(e) = customers.create(Some(&operator), &customer("Eve", "gold")).await {
        println!("Rejected: [{}] {}", e.error_code(), e);
    }

    let order = orders
        .create(
            Some(&operator),
            &Order {
                reference: "A-1001".to_string(),
                amount: 99.5,
                customer: ada.id,
            },
        )
        .await?;

    // === List ===
    let pro = customers
        .query_all(
            Some(&operator),
            Some(ListQuery {
                filter: Some(Expression::raw(r#"{"tier": "pro"}"#)),
                fields: None,
            }),
            Some(Pagination {
                offset: 0,
                ..Pagination::default()
            }),
            None,
        )
        .await?;
    println!("Pro customers: {}", serde_json::to_string_pretty(&pro)?);

    // === Populate ===
    let detailed = orders
        .get_by_id(
            Some(&operator),
            &order.id,
            None,
            Some(PopulateSpec::new("customer").with_select("name tier")),
        )
        .await?;
    println!("Order with customer: {}", json!(detailed));

    // === Update & delete ===
    customers
        .update(Some(&operator), &grace.id, &json!({"tier": "pro"}))
        .await?;
    customers.delete(Some(&operator), &grace.id).await?;

    match customers.delete(Some(&operator), &grace.id).await {
        Err(e) => println!("Second delete: {}", serde_json::to_string(&e.to_response())?),
        Ok(()) => println!("Second delete unexpectedly succeeded"),
    }

    // === Tokens ===
    let token = customers.issue_token(&operator)?;
    let claims: TokenClaims<ActingUser> = customers.verify_token(&token)?;
    println!("Token for '{}' expires at {:?}", claims.user.id, claims.exp);

    Ok(())
}

fn validators_for_orders() -> FieldRules {
    FieldRules::new()
        .field("reference", validators::required())
        .field("amount", validators::positive())
        .field("amount", validators::max_value(10_000.0))
}
