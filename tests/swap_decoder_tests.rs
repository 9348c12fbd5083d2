// Decoder tests over fully-encoded transactions (the same shapes the RPC
// returns), exercising account-table flattening and inner-instruction
// decoding along the way.

mod common;

use common::{inner_ix, key, meta_base, stable_sell_tx, token_balance, versioned_tx};
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::UiInnerInstructions;

use retroprice::swap::programs::{
    JUPITER_PROGRAM_ID, JUPITER_ROUTE_EVENT_DISCRIMINATOR, TOKEN_PROGRAM_ID, WRAPPED_SOL_MINT,
};
use retroprice::SwapParser;

#[test]
fn decodes_a_pool_swap_from_encoded_parts() {
    let target = key(0xA7);
    let usdc = key(0xC0);
    let (tx, meta) = stable_sell_tx(target, 1_000_000_000_000, 9, usdc, 25_000_000, 6);

    let parser = SwapParser::new(&tx, &meta).unwrap();
    let summary = parser.parse().unwrap().expect("swap expected");

    assert_eq!(summary.token_in_mint, target);
    assert_eq!(summary.token_in_amount, 1_000_000_000_000);
    assert_eq!(summary.token_in_decimals, 9);
    assert_eq!(summary.token_out_mint, usdc);
    assert_eq!(summary.token_out_amount, 25_000_000);
    assert_eq!(summary.token_out_decimals, 6);
    assert_eq!(summary.signers, vec![key(1)]);
    assert_eq!(summary.signatures.len(), 1);
}

#[test]
fn burn_instruction_marks_liquidity_not_swap() {
    let target = key(0xA7);
    let usdc = key(0xC0);
    let (tx, mut meta) = stable_sell_tx(target, 1_000_000_000, 9, usdc, 25_000_000, 6);

    // Append a burn (opcode 8) to the inner set.
    if let OptionSerializer::Some(sets) = &mut meta.inner_instructions {
        sets[0]
            .instructions
            .push(inner_ix(1, vec![3, 4], &[8, 0, 0, 0, 0, 0, 0, 0, 0]));
    }

    let parser = SwapParser::new(&tx, &meta).unwrap();
    assert!(parser.parse().unwrap().is_none());
}

#[test]
fn jupiter_route_event_wins_over_raw_legs() {
    let signer = key(1);
    let tok = key(0xB2);
    // Keys: [signer, token program, jupiter, user wsol acct, pool wsol
    // acct, pool tok acct, user tok acct, pool authority]
    let keys = vec![
        signer,
        TOKEN_PROGRAM_ID,
        JUPITER_PROGRAM_ID,
        key(3),
        key(4),
        key(5),
        key(6),
        key(7),
    ];
    let tx = versioned_tx(
        keys,
        vec![common::compiled_ix(
            2,
            vec![3, 4, 5, 6],
            vec![0xE5; 10],
        )],
    );

    let mut event = JUPITER_ROUTE_EVENT_DISCRIMINATOR.to_vec();
    event.extend_from_slice(&[0xAA; 32]); // amm
    event.extend_from_slice(WRAPPED_SOL_MINT.as_ref());
    event.extend_from_slice(&150_000_000u64.to_le_bytes());
    event.extend_from_slice(tok.as_ref());
    event.extend_from_slice(&2_000_000_000u64.to_le_bytes());

    let mut meta = meta_base();
    meta.pre_balances = vec![1_000_000_000, 0, 0, 0, 0, 0, 0, 0];
    meta.post_balances = vec![849_000_000, 0, 0, 0, 0, 0, 0, 0];
    meta.inner_instructions = OptionSerializer::Some(vec![UiInnerInstructions {
        index: 0,
        instructions: vec![
            inner_ix(1, vec![3, 4, 0], &common::transfer_data(150_000_000)),
            inner_ix(1, vec![5, 6, 7], &common::transfer_data(2_000_000_000)),
            inner_ix(2, vec![], &event),
        ],
    }]);
    meta.pre_token_balances = OptionSerializer::Some(vec![
        token_balance(3, WRAPPED_SOL_MINT, signer, 150_000_000, 9),
        token_balance(6, tok, signer, 0, 6),
    ]);
    meta.post_token_balances = OptionSerializer::Some(vec![
        token_balance(3, WRAPPED_SOL_MINT, signer, 0, 9),
        token_balance(6, tok, signer, 2_000_000_000, 6),
    ]);

    let parser = SwapParser::new(&tx, &meta).unwrap();
    let summary = parser.parse().unwrap().expect("swap expected");

    assert_eq!(summary.amms, vec!["jupiter".to_string()]);
    assert_eq!(summary.token_in_mint, WRAPPED_SOL_MINT);
    assert_eq!(summary.token_in_amount, 150_000_000);
    assert_eq!(summary.token_out_mint, tok);
    assert_eq!(summary.token_out_amount, 2_000_000_000);
    // Decimals come from the balance rows.
    assert_eq!(summary.token_in_decimals, 9);
    assert_eq!(summary.token_out_decimals, 6);
}
