use clap::Parser;
use std::io::{Read, Write};
use std::net::TcpStream;

/// Connects through a running relay and reports the CONNECT reply.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, value_name = "ADDRESS", default_value = "127.0.0.1:1080")]
    proxy: String,

    #[arg(long, value_name = "HOST", default_value = "example.com")]
    target: String,

    #[arg(long, value_name = "PORT", default_value_t = 80)]
    port: u16,
}

fn main() {
    let args = Args::parse();
    match probe(&args) {
        Ok(()) => {
            println!("SOCKS5 CONNECT through {} succeeded", args.proxy);
            std::process::exit(0);
        }
        Err(e) => {
            println!("SOCKS5 probe failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn probe(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.target.is_empty() || args.target.len() > 255 {
        return Err("target host must be 1 to 255 bytes".into());
    }

    println!("Connecting to SOCKS5 relay at {}...", args.proxy);
    let mut sock = TcpStream::connect(&args.proxy)?;

    // Greeting: version 5, 1 method, method 0 (no authentication)
    sock.write_all(b"\x05\x01\x00")?;
    let mut selection = [0u8; 2];
    sock.read_exact(&mut selection)?;
    println!(
        "Method selection: {:02x} {:02x}",
        selection[0], selection[1]
    );
    if selection != [0x05, 0x00] {
        return Err(format!("relay refused no-auth: {:02x?}", selection).into());
    }

    // CONNECT with a domain-name destination
    let mut request = vec![0x05, 0x01, 0x00, 0x03, args.target.len() as u8];
    request.extend_from_slice(args.target.as_bytes());
    request.extend_from_slice(&args.port.to_be_bytes());
    sock.write_all(&request)?;

    let mut header = [0u8; 4];
    sock.read_exact(&mut header)?;
    let address_len = match header[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            sock.read_exact(&mut len)?;
            len[0] as usize
        }
        other => return Err(format!("unknown address type {:#04x} in reply", other).into()),
    };
    let mut bound = vec![0u8; address_len + 2];
    sock.read_exact(&mut bound)?;

    println!(
        "Reply code {:#04x}, bound address {:02x?}, bound port {}",
        header[1],
        &bound[..address_len],
        u16::from_be_bytes([bound[address_len], bound[address_len + 1]])
    );

    if header[1] != 0x00 {
        return Err(format!("CONNECT to {}:{} failed", args.target, args.port).into());
    }
    Ok(())
}
