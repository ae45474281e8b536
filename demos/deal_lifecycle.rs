/// deal lifecycle - funding, interest, repayment and redemption of one trade deal
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use trade_deal_rs::{
    Account, AssetRef, ClaimTopicOracle, DealConfig, InMemoryCustody, InvoiceItemId, Money,
    ParticipantId, SafeTimeProvider, TimeSource, TradeDealRegistry,
};

const KYC: u64 = 1;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    println!("=== trade deal lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let admin = ParticipantId::new("operator");
    let exporter = ParticipantId::new("exporter");
    let fund = ParticipantId::new("credit-fund");
    let usdc = AssetRef::new("USDC");

    let oracle = Arc::new(ClaimTopicOracle::new());
    oracle.attest(&fund, KYC);
    oracle.attest(&exporter, KYC);

    let custody = Arc::new(InMemoryCustody::with_assets(["CAFE-CT", "CAFE-IT", "USDC"]));
    custody.fund(&usdc, Account::from(&fund), Money::from_major(50_000));
    custody.fund(&usdc, Account::from(&exporter), Money::from_major(1_000));
    let invoice = InvoiceItemId::new("INV-2025-0042");
    custody.issue_item(invoice.clone(), Account::from(&exporter));

    let registry = TradeDealRegistry::new(admin.clone(), oracle, custody.clone(), time);

    // 1. structuring
    println!("1. structuring");
    println!("--------------");
    let mut config = DealConfig::invoice_financing("Green Coffee Export", "CAFE", Money::from_major(20_000), 900, usdc.clone());
    config.collateral_to_interest_ratio = dec!(1_000);
    config.required_topics = [KYC].into_iter().collect();
    let deal_id = registry.create_deal(&admin, config)?;
    registry.activate_deal(&admin, deal_id)?;
    println!("  deal {} created and activated", deal_id);

    // 2. collateral and funding
    println!("\n2. collateral and funding");
    println!("-------------------------");
    registry.deposit_invoice(deal_id, &exporter, &invoice)?;
    println!("  invoice {} placed in escrow", invoice);
    let minted = registry.deposit_funding(deal_id, &fund, Money::from_major(20_000))?;
    println!("  credit fund deposited 20000 USDC, received {} CAFE-CT", minted);

    let principal = registry.withdraw_funding_for_borrower(&admin, deal_id, &exporter)?;
    println!("  {} USDC disbursed to the exporter", principal);

    // 3. interest
    println!("\n3. interest");
    println!("-----------");
    for month in 1..=3 {
        controller.advance(Duration::days(30));
        if let Some(record) = registry.distribute_interest(&admin, deal_id)? {
            println!(
                "  month {}: interest {} (invoice pool {}, interest pool {}), {} CAFE-IT minted",
                month, record.total_interest, record.invoice_pool_share, record.interest_pool_share, record.tokens_minted
            );
        }
    }

    // 4. repayment
    println!("\n4. repayment");
    println!("------------");
    let status = registry.get_full_status(deal_id)?;
    let outstanding = status.debt.outstanding();
    println!("  outstanding debt: {}", outstanding);
    registry.settle_invoice(&admin, deal_id, &invoice)?;
    let outcome = registry.repay(deal_id, &exporter, outstanding)?;
    println!("  repaid {}, fully repaid: {}", outcome.repaid_total, outcome.became_repaid);

    // 5. redemption
    println!("\n5. redemption");
    println!("-------------");
    let holding = registry.collateral_balance(deal_id, &fund)?;
    let paid = registry.redeem_collateral_tokens(deal_id, &fund, holding)?;
    println!("  {} CAFE-CT redeemed for {} USDC", holding, paid);
    println!(
        "  credit fund USDC balance: {}",
        custody.balance(&usdc, &Account::from(&fund))
    );

    println!("\nfinal status:");
    println!("{}", registry.status_json(deal_id)?);

    for event in registry.take_events(deal_id)? {
        log::debug!("{:?}", event);
    }
    Ok(())
}
