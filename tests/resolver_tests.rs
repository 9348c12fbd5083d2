// End-to-end resolver tests over a scripted chain backend.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{key, stable_sell_tx, FixedSolUsd, MockChain};
use retroprice::resolver::price::StableMints;
use retroprice::{PriceError, Resolver, ResolverConfig};

const TARGET_DEC: u8 = 9;
const STABLE_DEC: u8 = 6;

fn stables() -> StableMints {
    StableMints {
        usdc: key(0xC0),
        usdt: key(0xC1),
    }
}

fn resolver_with(chain: MockChain, config: ResolverConfig) -> Resolver {
    Resolver::new(
        Arc::new(chain),
        Arc::new(FixedSolUsd(200.0)),
        stables(),
        config,
    )
}

/// 1000 target tokens sold for 25 USDC: 0.025 USD each, 25 USD notional.
fn seed_swap(target: solana_sdk::pubkey::Pubkey) -> (
    solana_sdk::transaction::VersionedTransaction,
    solana_transaction_status::UiTransactionStatusMeta,
) {
    stable_sell_tx(
        target,
        1_000_000_000_000,
        TARGET_DEC,
        stables().usdc,
        25_000_000,
        STABLE_DEC,
    )
}

#[tokio::test]
async fn price_resolves_at_the_closest_slot() {
    let target = key(0xA7);
    let mut chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);
    chain.put_block(900, vec![seed_swap(target)]);

    let resolver = resolver_with(chain, ResolverConfig::default());
    let res = resolver.resolve(target, t).await.unwrap();

    assert!(res.ok);
    assert_eq!(res.slot, 900);
    assert_eq!(res.scanned_slots, 0);
    assert_eq!(res.kept, 1);
    assert!((res.price_usd - 0.025).abs() < 1e-12);
    assert!((res.sum_weight - 25.0).abs() < 1e-9);
}

#[tokio::test]
async fn backoff_stops_at_the_first_slot_with_evidence() {
    let target = key(0xA7);
    let mut chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);
    // Slot 900 has no swaps; 899 and 898 both do. Only 899 may be used.
    chain.put_block(899, vec![seed_swap(target)]);
    chain.put_block(898, vec![seed_swap(target)]);

    let resolver = resolver_with(chain, ResolverConfig::default());
    let res = resolver.resolve(target, t).await.unwrap();

    assert!(res.ok);
    assert_eq!(res.slot, 899);
    assert_eq!(res.scanned_slots, 1);
    assert!((res.price_usd - 0.025).abs() < 1e-12);
}

#[tokio::test]
async fn backoff_never_descends_past_the_first_hit() {
    let target = key(0xA7);
    let mut chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);
    chain.put_block(899, vec![seed_swap(target)]);
    chain.put_block(898, vec![seed_swap(target)]);

    // Keep a handle on the chain to inspect the block-fetch log afterwards.
    let chain = Arc::new(chain);
    let resolver = Resolver::new(
        chain.clone(),
        Arc::new(FixedSolUsd(200.0)),
        stables(),
        ResolverConfig::default(),
    );
    let res = resolver.resolve(target, t).await.unwrap();
    assert_eq!(res.slot, 899);

    let fetched = chain.fetched();
    assert!(fetched.contains(&900));
    assert!(fetched.contains(&899));
    assert!(
        !fetched.contains(&898),
        "scan must stop at the first slot with evidence"
    );
}

#[tokio::test]
async fn empty_window_yields_no_observations() {
    let target = key(0xA7);
    let chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);

    let config = ResolverConfig {
        backoff_slots: Some(5),
        ..Default::default()
    };
    let resolver = resolver_with(chain, config);
    let err = resolver.resolve(target, t).await.unwrap_err();
    match err {
        PriceError::NoObservations { scanned_slots, .. } => assert_eq!(scanned_slots, 5),
        other => panic!("expected NoObservations, got {other}"),
    }
}

#[tokio::test]
async fn expired_deadline_cancels() {
    let target = key(0xA7);
    let chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);

    let config = ResolverConfig {
        deadline: Some(Instant::now() - Duration::from_secs(1)),
        ..Default::default()
    };
    let resolver = resolver_with(chain, config);
    let err = resolver.resolve(target, t).await.unwrap_err();
    assert!(matches!(err, PriceError::Cancelled(_)));
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let chain = MockChain::new(1_000, 1_700_000_000);
    let resolver = resolver_with(chain, ResolverConfig::default());

    let err = resolver
        .resolve(solana_sdk::pubkey::Pubkey::default(), 1_700_000_000)
        .await
        .unwrap_err();
    assert!(matches!(err, PriceError::BadInput(_)));

    let err = resolver.resolve(key(0xA7), 0).await.unwrap_err();
    assert!(matches!(err, PriceError::BadInput(_)));
}

#[tokio::test]
async fn observations_from_multiple_swaps_aggregate() {
    let target = key(0xA7);
    let mut chain = MockChain::new(1_000, 1_700_000_000);
    let t = chain.time_of(900);
    // Two consistent swaps and one at a wildly different price; the fence
    // keeps the consistent pair.
    chain.put_block(
        900,
        vec![
            seed_swap(target),
            stable_sell_tx(
                target,
                1_000_000_000_000,
                TARGET_DEC,
                stables().usdc,
                26_000_000,
                STABLE_DEC,
            ),
            stable_sell_tx(
                target,
                1_000_000_000_000,
                TARGET_DEC,
                stables().usdc,
                900_000_000,
                STABLE_DEC,
            ),
        ],
    );

    let resolver = resolver_with(chain, ResolverConfig::default());
    let res = resolver.resolve(target, t).await.unwrap();

    assert!(res.ok);
    assert_eq!(res.kept, 2);
    // Weighted by 25 and 26 USD notionals.
    let expected = (0.025 * 25.0 + 0.026 * 26.0) / 51.0;
    assert!((res.price_usd - expected).abs() < 1e-9);
}
