mod common;

use anyhow::Result;
use common::{john_doe, test_service};
use ledger_service::application::{ApplyRequest, ErrorClass, LedgerError};
use ledger_service::currency::{Currency, FixedRateConverter, REFERENCE_CURRENCY};
use uuid::Uuid;

fn rates() -> FixedRateConverter {
    FixedRateConverter::new()
        .with_rate(Currency::Usd, Currency::Eur, 0.5)
        .with_rate(Currency::Usd, Currency::Gbp, 0.75)
}

#[tokio::test]
async fn test_balance_in_display_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let customer = john_doe(&service, 120000).await?;

    let eur = service
        .get_balance_in(customer.id, Currency::Eur, &rates())
        .await?;
    assert_eq!(eur.balance_cents, 60000);
    assert_eq!(eur.currency, Currency::Eur);

    let gbp = service
        .get_balance_in(customer.id, Currency::Gbp, &rates())
        .await?;
    assert_eq!(gbp.balance_cents, 90000);

    // Conversion is presentation only
    assert_eq!(service.get_balance(customer.id).await?, 120000);

    Ok(())
}

#[tokio::test]
async fn test_reference_currency_needs_no_rate() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let customer = john_doe(&service, 4321).await?;

    let balance = service
        .get_balance_in(customer.id, REFERENCE_CURRENCY, &FixedRateConverter::new())
        .await?;
    assert_eq!(balance.balance_cents, 4321);
    assert_eq!(balance.currency, Currency::Usd);

    Ok(())
}

#[tokio::test]
async fn test_missing_rate_is_a_server_error() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let customer = john_doe(&service, 1000).await?;

    let err = service
        .get_balance_in(customer.id, Currency::Gbp, &FixedRateConverter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conversion(_)));
    assert_eq!(err.class(), ErrorClass::ServerError);

    // A failed conversion leaves the ledger untouched and usable
    service.apply(ApplyRequest::credit(customer.id, 500)).await?;
    assert_eq!(service.get_balance(customer.id).await?, 1500);

    Ok(())
}

#[tokio::test]
async fn test_unknown_customer_is_reported_before_converting() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service
        .get_balance_in(Uuid::new_v4(), Currency::Eur, &FixedRateConverter::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_converter_as_trait_object() -> Result<()> {
    use ledger_service::currency::CurrencyConverter;

    let (service, _temp) = test_service().await?;
    let customer = john_doe(&service, 2000).await?;

    let converter: Box<dyn CurrencyConverter> = Box::new(rates());
    let eur = service
        .get_balance_in(customer.id, Currency::Eur, converter.as_ref())
        .await?;
    assert_eq!(eur.balance_cents, 1000);

    Ok(())
}
