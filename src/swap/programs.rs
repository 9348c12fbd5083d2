//! Program ids and instruction discriminators for the DEXes, aggregators
//! and routers the decoder understands.

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

// Token programs (classic + 2022 are both treated as "token program").
pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Wrapped SOL; also used as the marker mint for native-SOL legs.
pub const WRAPPED_SOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

// Aggregators and routers.
pub const JUPITER_PROGRAM_ID: Pubkey = pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");
pub const JUPITER_DCA_PROGRAM_ID: Pubkey = pubkey!("DCA265Vj8a9CEuX1eb1LWRnDT7uK6q1xMipnNyatn23M");
pub const OKX_DEX_ROUTER_PROGRAM_ID: Pubkey =
    pubkey!("6m2CDdhRgxpH4WjvdzxAYbGxwdGUz5MziiL5jek2kBma");
pub const BANANA_GUN_PROGRAM_ID: Pubkey = pubkey!("BANANAjs7FJiPQqJTGFzkZJndT9o7UmKiYYGaJz6frGu");
pub const MAESTRO_PROGRAM_ID: Pubkey = pubkey!("MaestroAAe9ge5HTc64VbBQZ6fP77pwvrhM8i1XWSAx");
pub const BLOOM_PROGRAM_ID: Pubkey = pubkey!("b1oomGGqPKGD6errbyfbVMBuzSC8WtAAYo8MwNafWW1");

// Raydium family.
pub const RAYDIUM_V4_PROGRAM_ID: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
pub const RAYDIUM_CPMM_PROGRAM_ID: Pubkey = pubkey!("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C");
pub const RAYDIUM_CLMM_PROGRAM_ID: Pubkey = pubkey!("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK");
pub const RAYDIUM_ROUTE_PROGRAM_ID: Pubkey = pubkey!("routeUGWgWzqBWFcrCfv8tritsqukccJPu3q5GPP3xS");
pub const RAYDIUM_LAUNCHLAB_PROGRAM_ID: Pubkey =
    pubkey!("LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj");

// Orca whirlpools.
pub const ORCA_WHIRLPOOL_PROGRAM_ID: Pubkey =
    pubkey!("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc");

// Meteora family.
pub const METEORA_DLMM_PROGRAM_ID: Pubkey = pubkey!("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo");
pub const METEORA_POOLS_PROGRAM_ID: Pubkey =
    pubkey!("Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB");
pub const METEORA_DBC_PROGRAM_ID: Pubkey = pubkey!("dbcij3LWUppWqq96dh6gJWwBifmcGfLSB5D4DuSMaqN");
pub const METEORA_DAMM_V2_PROGRAM_ID: Pubkey =
    pubkey!("cpamdpZCGKUy5JxQXB4dcpGPiikHawvSWAd6mEn1sGG");

// Pump.fun.
pub const PUMPFUN_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const PUMPFUN_AMM_PROGRAM_ID: Pubkey = pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");

/// Anchor event-CPI discriminators are 16 bytes: the event-CPI marker
/// followed by the hashed event name.
pub const JUPITER_ROUTE_EVENT_DISCRIMINATOR: [u8; 16] = [
    228, 69, 165, 46, 81, 203, 154, 29, 64, 198, 205, 232, 38, 8, 113, 226,
];
pub const PUMPFUN_TRADE_EVENT_DISCRIMINATOR: [u8; 16] = [
    228, 69, 165, 46, 81, 203, 154, 29, 189, 219, 127, 211, 78, 230, 97, 238,
];

// Pump.fun outer-instruction discriminators.
pub const PUMPFUN_BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
pub const PUMPFUN_SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

// OKX router instruction discriminators (swap / swap2 / commission swap2 /
// swap3 variants). Unknown ones still get the leg-extraction fallback.
pub const OKX_SWAP_DISCRIMINATORS: [[u8; 8]; 4] = [
    [248, 198, 158, 145, 225, 117, 135, 200],
    [65, 75, 63, 76, 235, 91, 91, 136],
    [173, 131, 78, 38, 150, 165, 123, 15],
    [19, 44, 130, 148, 72, 56, 44, 238],
];

/// Whether `program` is one of the recognized AMM programs (used by the
/// liquidity pre-filter and router leg extraction).
pub fn is_amm_program(program: &Pubkey) -> bool {
    matches!(
        *program,
        RAYDIUM_V4_PROGRAM_ID
            | RAYDIUM_CPMM_PROGRAM_ID
            | RAYDIUM_CLMM_PROGRAM_ID
            | RAYDIUM_ROUTE_PROGRAM_ID
            | RAYDIUM_LAUNCHLAB_PROGRAM_ID
            | ORCA_WHIRLPOOL_PROGRAM_ID
            | METEORA_DLMM_PROGRAM_ID
            | METEORA_POOLS_PROGRAM_ID
            | METEORA_DBC_PROGRAM_ID
            | METEORA_DAMM_V2_PROGRAM_ID
            | PUMPFUN_PROGRAM_ID
            | PUMPFUN_AMM_PROGRAM_ID
    )
}

pub fn is_token_program(program: &Pubkey) -> bool {
    *program == TOKEN_PROGRAM_ID || *program == TOKEN_2022_PROGRAM_ID
}

pub fn is_raydium_program(program: &Pubkey) -> bool {
    matches!(
        *program,
        RAYDIUM_V4_PROGRAM_ID
            | RAYDIUM_CPMM_PROGRAM_ID
            | RAYDIUM_CLMM_PROGRAM_ID
            | RAYDIUM_ROUTE_PROGRAM_ID
            | RAYDIUM_LAUNCHLAB_PROGRAM_ID
    )
}

pub fn is_meteora_program(program: &Pubkey) -> bool {
    matches!(
        *program,
        METEORA_DLMM_PROGRAM_ID
            | METEORA_POOLS_PROGRAM_ID
            | METEORA_DBC_PROGRAM_ID
            | METEORA_DAMM_V2_PROGRAM_ID
    )
}

pub fn is_router_program(program: &Pubkey) -> bool {
    matches!(
        *program,
        BANANA_GUN_PROGRAM_ID | MAESTRO_PROGRAM_ID | BLOOM_PROGRAM_ID
    )
}
