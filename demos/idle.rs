use std::time::Duration;

use clap::Parser;
use mailwire::{ClientBuilder, MailEvent};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Opt {
    // The server name to connect to
    #[clap(short, long)]
    server: String,

    // The port to use
    #[clap(short, long, default_value = "993")]
    port: u16,

    // The account username
    #[clap(short, long)]
    username: String,

    // The account password
    #[clap(short = 'w', long)]
    password: String,

    // The mailbox to IDLE on
    #[clap(short, long, default_value = "INBOX")]
    mailbox: String,

    // How many events to wait for before exiting
    #[clap(short = 'n', long, default_value = "5")]
    events: usize,
}

fn main() -> mailwire::Result<()> {
    let opt = Opt::parse();

    let mut client = ClientBuilder::new(opt.server.as_str(), opt.port)
        .idle_keepalive(Duration::from_secs(20 * 60))
        .connect()?;
    client.login(&opt.username, &opt.password)?;

    let mailbox = client.select(&opt.mailbox)?;
    println!("{} holds {} messages", mailbox.name, mailbox.exists);

    let events = client.subscribe()?;
    for event in events.iter().take(opt.events) {
        match event {
            MailEvent::NewMessage(count) => {
                let message = client.paused(|c| c.fetch_message(count))?;
                println!(
                    "new message from {:?}: {}",
                    message.from().first().map(|a| a.address.clone()),
                    message.subject().unwrap_or("(no subject)")
                );
            }
            MailEvent::Expunged(seq) => println!("message {} was removed", seq),
            other => println!("{:?}", other),
        }
    }

    client.unsubscribe(events)?;
    client.logout()
}
