use anyhow::Result;
use harvest_keeper::blockchain::load_signer;

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 2 {
        eprintln!("Usage: {} [ENV_VAR_NAME]", args[0]);
        std::process::exit(1);
    }

    let var = args.get(1).map(String::as_str).unwrap_or("PRIVATE_KEY");
    println!("🔐 Deriving address from key in ${}", var);

    // Chain id only affects signing, not the derived address
    let signer = load_signer(var, 1)?;
    let address = signer.address();

    println!("✅ Keeper address: {}", address);
    println!("💰 Fund this address with the chain's native token for gas payments");
    println!("🔍 Lowercase hex: 0x{}", hex::encode(address.as_slice()));

    Ok(())
}
