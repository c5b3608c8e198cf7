use crate::client::Client;
use seqnet_common::Crypto;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const PROMPT: &str = " >   ";

/// Line oriented front end for a [`Client`]. Reads commands from `input` and
/// writes everything meant for the user to `output`.
pub struct Shell<'a, R, W> {
    client: &'a Client,
    input: R,
    output: W,
}

impl<'a, R, W> Shell<'a, R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(client: &'a Client, input: R, output: W) -> Self {
        Shell {
            client,
            input,
            output,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Login followed by the command loop. Returns when the user quits or the
    /// input ends.
    pub async fn run(&mut self) -> io::Result<()> {
        self.say(&format!("Listening at {}", self.client.addr())).await?;
        if !self.login().await? {
            return Ok(());
        }
        self.say("\nEnter 'help' for list of commands").await?;
        loop {
            let Some(line) = self.ask(None).await? else {
                self.quit().await?;
                return Ok(());
            };
            if self.handle(&line).await? {
                return Ok(());
            }
        }
    }

    /// Returns false if the input ended before credentials were set.
    pub async fn login(&mut self) -> io::Result<bool> {
        loop {
            let Some(answer) = self
                .ask(Some("Provide credentials (P), or generate new (G)? :"))
                .await?
            else {
                return Ok(false);
            };
            match answer.to_uppercase().as_str() {
                "P" => loop {
                    let Some(secret) = self.ask(Some("Please provide secret key: ")).await? else {
                        return Ok(false);
                    };
                    match Crypto::from_secret_hex(&secret) {
                        Ok(keys) => {
                            self.client.provide_credentials(keys).await;
                            self.say("Credentials accepted").await?;
                            return Ok(true);
                        }
                        Err(e) => self.say(&format!("Error when parsing secret key : {e}")).await?,
                    }
                },
                "G" => {
                    let keys = self.client.generate_credentials().await;
                    self.say("Credentials successfully generated").await?;
                    self.say(&format!("Account : {}", keys.account())).await?;
                    self.say(&format!("Secret key : {}", keys.secret_hex())).await?;
                    return Ok(true);
                }
                _ => self.say("Invalid input").await?,
            }
        }
    }

    /// Runs one command. Returns true when the shell should exit.
    pub async fn handle(&mut self, command: &str) -> io::Result<bool> {
        match command {
            "help" => self.help().await?,
            "connect" => self.connect().await?,
            "balance" => self.balance().await?,
            "transfer" => self.transfer().await?,
            "status" => self.status().await?,
            "peers" => {
                for peer in self.client.peers().await {
                    self.say(&format!("  {peer}")).await?;
                }
            }
            "quit" => {
                self.quit().await?;
                return Ok(true);
            }
            "" => {}
            _ => {
                self.say("Illegal input: (Enter 'help' for list of commands)")
                    .await?
            }
        }
        Ok(false)
    }

    async fn help(&mut self) -> io::Result<()> {
        self.say("Valid commands: ").await?;
        for (command, text) in [
            ("quit", "exits the shell"),
            ("help", "prints this"),
            ("connect", "connects to another node"),
            ("transfer", "transfers funds to another account"),
            ("balance", "looks up the balance of an account"),
            ("status", "shows the status of a submitted transfer"),
            ("peers", "lists known peers"),
        ] {
            self.say(&format!("{command:<12} : {text}")).await?;
        }
        Ok(())
    }

    async fn connect(&mut self) -> io::Result<()> {
        let Some(input) = self.ask(Some("Please input target address (ip:port): ")).await? else {
            return Ok(());
        };
        let addr: SocketAddr = match input.parse() {
            Ok(addr) => addr,
            Err(_) => return self.say("Cancelling : Invalid address entered").await,
        };
        match self.client.connect(addr).await {
            Ok(()) => self.say(&format!("Successfully connected to : {addr}")).await,
            Err(e) => self.say(&format!("Error : {e}")).await,
        }
    }

    async fn balance(&mut self) -> io::Result<()> {
        let Some(account) = self
            .ask(Some(
                "Please enter account to look up balance: (Nothing for own account)",
            ))
            .await?
        else {
            return Ok(());
        };
        let account = match account.as_str() {
            "" => match self.client.account().await {
                Some(own) => own,
                None => return self.say("No credentials provided").await,
            },
            _ => account,
        };
        let balance = self.client.balance(&account).await;
        self.say(&format!("Balance : {balance:.6}")).await
    }

    async fn transfer(&mut self) -> io::Result<()> {
        let to = match self
            .ask(Some("Please enter recipient account (Nothing to cancel)"))
            .await?
        {
            Some(to) if !to.is_empty() => to,
            _ => return self.say("Transaction cancelled").await,
        };
        self.say(&format!("Transferring to # {to}")).await?;
        let amount = match self
            .ask(Some("Please enter amount (Nothing to cancel)"))
            .await?
        {
            Some(amount) if !amount.is_empty() => amount,
            _ => return self.say("Transaction cancelled").await,
        };
        let Ok(amount) = amount.parse::<f64>() else {
            return self.say("Error NAN").await;
        };
        match self.client.transfer(amount, &to).await {
            Ok(id) => self.say(&format!("Transaction submitted : {id}")).await,
            Err(e) => self.say(&format!("Error performing transaction : {e}")).await,
        }
    }

    async fn status(&mut self) -> io::Result<()> {
        let Some(id) = self.ask(Some("Please enter transaction id")).await? else {
            return Ok(());
        };
        match self.client.tx_status(&id) {
            Ok(status) => self.say(&format!("Status : {status:?}")).await,
            Err(e) => self.say(&format!("Error : {e}")).await,
        }
    }

    async fn quit(&mut self) -> io::Result<()> {
        self.say("Quitting ... ").await?;
        for e in self.client.close().await {
            self.say(&format!("Error closing connection : {e}")).await?;
        }
        Ok(())
    }

    /// Prints `question` (if any) and a prompt, then reads one trimmed line.
    /// `None` means end of input.
    async fn ask(&mut self, question: Option<&str>) -> io::Result<Option<String>> {
        if let Some(question) = question {
            self.say(question).await?;
        }
        self.output.write_all(PROMPT.as_bytes()).await?;
        self.output.flush().await?;
        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn say(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await
    }
}
