//! # Load Generator
//! src/bin/loadgen.rs
//!
//! Cliente concurrente para probar el servidor bajo carga. Abre
//! `--clients` conexiones con a lo sumo `--concurrency` en vuelo y cuenta
//! como éxito toda respuesta `200 OK` o `503 Service Unavailable` (el 503
//! es la respuesta esperada cuando la cola compartida se llena).
//!
//! ```bash
//! loadgen --port 8080 --clients 1000 --concurrency 50 --path /index.html
//! ```
//!
//! Termina con código 1 si alguna conexión quedó sin contabilizar.

use clap::Parser;
use serde::Serialize;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "loadgen")]
#[command(about = "Cliente concurrente para el servidor de archivos")]
struct Args {
    /// Host del servidor
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Puerto del servidor
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Conexiones totales
    #[arg(short = 'n', long, default_value = "100")]
    clients: u64,

    /// Conexiones simultáneas como máximo
    #[arg(short, long, default_value = "10")]
    concurrency: u64,

    /// Recurso pedido en cada conexión
    #[arg(long, default_value = "/index.html")]
    path: String,

    /// Timeout de conexión/lectura en segundos
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Resumen en JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default)]
struct Counters {
    next: AtomicU64,
    ok: AtomicU64,
    unavailable: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Serialize)]
struct Summary {
    clients: u64,
    concurrency: u64,
    ok: u64,
    unavailable: u64,
    success: u64,
    failure: u64,
    elapsed_secs: f64,
    requests_per_sec: f64,
}

enum Reply {
    Ok,
    Unavailable,
    Other,
}

fn main() {
    let args = Args::parse();
    if args.clients == 0 || args.concurrency == 0 || args.concurrency > args.clients {
        eprintln!("loadgen: need clients >= 1 and 1 <= concurrency <= clients");
        std::process::exit(2);
    }

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        args.path, args.host
    );
    let target = format!("{}:{}", args.host, args.port);
    let timeout = Duration::from_secs(args.timeout.max(1));
    let counters = Arc::new(Counters::default());

    println!("--- loadgen ---");
    println!(
        "target: {}{}  clients: {}  concurrency: {}",
        target, args.path, args.clients, args.concurrency
    );

    // 1. `concurrency` threads se reparten las `clients` conexiones
    let start = Instant::now();
    let mut threads = Vec::with_capacity(args.concurrency as usize);
    for i in 0..args.concurrency {
        let counters = Arc::clone(&counters);
        let request = request.clone();
        let target = target.clone();
        let total = args.clients;

        let spawned = thread::Builder::new()
            .name(format!("client-{}", i))
            .spawn(move || {
                while counters.next.fetch_add(1, Ordering::SeqCst) < total {
                    let counter = match run_client(&target, &request, timeout) {
                        Reply::Ok => &counters.ok,
                        Reply::Unavailable => &counters.unavailable,
                        Reply::Other => &counters.failed,
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
        match spawned {
            Ok(handle) => threads.push(handle),
            Err(e) => eprintln!("loadgen: cannot spawn client thread: {}", e),
        }
    }

    // Si ningún thread arrancó, nadie contabiliza nada
    if threads.is_empty() {
        std::process::exit(1);
    }
    for handle in threads {
        let _ = handle.join();
    }
    let elapsed = start.elapsed().as_secs_f64();

    // 2. Resumen
    let ok = counters.ok.load(Ordering::SeqCst);
    let unavailable = counters.unavailable.load(Ordering::SeqCst);
    let failure = counters.failed.load(Ordering::SeqCst);
    let success = ok + unavailable;
    let summary = Summary {
        clients: args.clients,
        concurrency: args.concurrency,
        ok,
        unavailable,
        success,
        failure,
        elapsed_secs: elapsed,
        requests_per_sec: if elapsed > 0.0 { (success + failure) as f64 / elapsed } else { 0.0 },
    };

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("loadgen: {}", e),
        }
    } else {
        println!("\n--- results ---");
        println!("requests sent:        {}", summary.clients);
        println!("success (200/503):    {} ({} ok, {} unavailable)", success, ok, unavailable);
        println!("failure:              {}", failure);
        println!("elapsed:              {:.2}s", summary.elapsed_secs);
        println!("throughput:           {:.1} req/s", summary.requests_per_sec);
    }

    if success + failure != args.clients {
        std::process::exit(1);
    }
}

/// Una conexión: envía el request y clasifica la status line
fn run_client(target: &str, request: &str, timeout: Duration) -> Reply {
    let attempt = || -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect(target)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.write_all(request.as_bytes())?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;
        Ok(response)
    };

    match attempt() {
        Ok(response) => classify(&response),
        Err(_) => Reply::Other,
    }
}

fn classify(response: &[u8]) -> Reply {
    let status_line = response.split(|&b| b == b'\n').next().unwrap_or_default();
    let status_line = String::from_utf8_lossy(status_line);
    if status_line.contains(" 200 ") {
        Reply::Ok
    } else if status_line.contains(" 503 ") {
        Reply::Unavailable
    } else {
        Reply::Other
    }
}
