//! Human-readable names for the chains the service is commonly pointed at,
//! used to label logs.

/// Returns a display name for well-known chain ids, or the decimal id for
/// everything else.
pub fn chain_name(chain_id: u64) -> String {
    match chain_id {
        1 => "Ethereum".into(),
        10 => "Optimism".into(),
        25 => "Cronos".into(),
        56 => "BSC".into(),
        106 => "Velas".into(),
        137 => "Polygon".into(),
        199 => "BitTorrent".into(),
        250 => "Fantom".into(),
        324 => "zkSync Era".into(),
        1101 => "Polygon zkEVM".into(),
        8453 => "Base".into(),
        42161 => "Arbitrum".into(),
        42262 => "Oasis".into(),
        43114 => "Avalanche".into(),
        59144 => "Linea".into(),
        1313161554 => "Aurora".into(),
        _ => chain_id.to_string(),
    }
}
