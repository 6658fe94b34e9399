use anyhow::Context;
use framechat::{
    arguments::{self, ClientArguments},
    client, init_tracing,
    message::Message,
};
use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let args: ClientArguments = arguments::parse();
    init_tracing(args.console)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let port = match args.port {
        Some(port) => port,
        None => read_port(&mut input)?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let stream = runtime.block_on(client::connect(&args.host, port))?;

    let (client, commands) = client::channel();
    let worker = std::thread::spawn(move || {
        runtime.block_on(async move {
            let (reader, writer) = stream.into_split();
            client::run(reader, writer, commands, print_message).await
        })
    });

    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes_read = input
            .read_until(b'\n', &mut line)
            .context("Failed to read from stdin")?;
        if bytes_read == 0 {
            break; // EOF detected.
        }
        if line.ends_with(b"\n") {
            line.pop();
        }
        if line.ends_with(b"\r") {
            line.pop();
        }
        if client.write(Message::new(&line)).is_err() {
            break;
        }
    }

    // The I/O thread may already be gone if the server hung up.
    let _ = client.close();
    worker
        .join()
        .map_err(|_| anyhow::anyhow!("I/O thread panicked"))?
}

/// Ask for the server port on stdin.
fn read_port(input: &mut impl BufRead) -> anyhow::Result<u16> {
    print!("input port : ");
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut port = String::new();
    input
        .read_line(&mut port)
        .context("Failed to read port")?;
    port.trim()
        .parse()
        .context(format!("Invalid port {:?}", port.trim()))
}

fn print_message(message: Message) {
    println!("{}", String::from_utf8_lossy(message.body()));
}
