use chrono::Local;
use futures::StreamExt;
use log::debug;
use std::error::Error;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::ReceiverStream;

use crate::api::SendError;
use crate::history::grouping::group_conversations;
use crate::session::{ChatEvent, ChatSession};

/// Interactive console front for the chat session: prompts stream in place,
/// conversation-list actions are slash commands.
pub struct Console {
    session: ChatSession,
    /// Ids as last printed by `/list`, for numeric `/open` and `/delete`.
    listed: Vec<String>,
}

impl Console {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session,
            listed: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        println!("Asistente IA — escribe tu prompt, o /help para los comandos.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        prompt_marker();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                prompt_marker();
                continue;
            }
            if let Some(command) = line.strip_prefix('/') {
                if !self.handle_command(command).await {
                    break;
                }
            } else {
                self.send_turn(line).await;
            }
            prompt_marker();
        }
        Ok(())
    }

    /// Returns false when the console should exit.
    async fn handle_command(&mut self, command: &str) -> bool {
        let (name, rest) = match command.split_once(' ') {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };
        match name {
            "new" => self.new_chat().await,
            "list" => self.list(rest).await,
            "open" => self.open(rest).await,
            "rename" => self.rename(rest).await,
            "delete" => self.delete(rest).await,
            "retry" => self.retry_turn().await,
            "help" => print_help(),
            "quit" | "exit" => return false,
            other => println!("Comando desconocido: /{}", other),
        }
        true
    }

    async fn send_turn(&mut self, text: &str) {
        match self.session.send(text).await {
            Ok(events) => self.consume(events).await,
            Err(e) => print_error(&e),
        }
    }

    async fn retry_turn(&mut self) {
        match self.session.retry().await {
            Ok(Some(events)) => self.consume(events).await,
            Ok(None) => println!("Nada que reintentar."),
            Err(e) => print_error(&e),
        }
    }

    async fn consume(&mut self, mut events: ReceiverStream<ChatEvent>) {
        let mut done = false;
        while let Some(event) = events.next().await {
            match event {
                ChatEvent::Delta(delta) => {
                    print!("{}", delta);
                    let _ = std::io::stdout().flush();
                }
                ChatEvent::Done => {
                    done = true;
                    println!();
                }
                ChatEvent::Failed(e) => {
                    println!();
                    print_error(&e);
                    return;
                }
            }
        }
        // Closed without Done: the stream was aborted by a newer turn.
        if !done {
            debug!("Stream closed without completion");
        }
    }

    async fn new_chat(&mut self) {
        let store = self.session.store();
        let mut store = store.lock().await;
        match store.create_conversation().await {
            Ok(id) => println!("Nuevo chat activo ({}).", id),
            Err(e) => println!("No se pudo crear el chat: {}", e),
        }
    }

    async fn list(&mut self, search: &str) {
        let store = self.session.store();
        let store = store.lock().await;
        let today = Local::now().date_naive();
        let groups = group_conversations(store.conversations(), search, today);

        if groups.is_empty() {
            println!("No hay chats todavía.");
            self.listed.clear();
            return;
        }

        self.listed.clear();
        let active = store.active_id().map(str::to_string);
        for (group, conversations) in groups.buckets() {
            if conversations.is_empty() {
                continue;
            }
            println!("{}", group.label().to_uppercase());
            for convo in conversations {
                self.listed.push(convo.id.clone());
                let marker = if active.as_deref() == Some(convo.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(" {}{:>3}. {}", marker, self.listed.len(), convo.title);
            }
        }
    }

    async fn open(&mut self, arg: &str) {
        let Some(id) = self.resolve(arg) else {
            println!("Chat no encontrado: {}", arg);
            return;
        };
        let store = self.session.store();
        let mut store = store.lock().await;
        if store.select(&id) {
            if let Some(convo) = store.get(&id) {
                println!("— {} —", convo.title);
                for msg in &convo.messages {
                    match msg.role {
                        crate::models::chat::ChatRole::User => println!("> {}", msg.content),
                        crate::models::chat::ChatRole::Assistant => println!("{}", msg.content),
                    }
                }
            }
        } else {
            println!("Chat no encontrado: {}", arg);
        }
    }

    async fn rename(&mut self, title: &str) {
        let store = self.session.store();
        let mut store = store.lock().await;
        let Some(id) = store.active_id().map(str::to_string) else {
            println!("No hay chat activo.");
            return;
        };
        match store.rename(&id, title).await {
            Ok(true) => println!("Renombrado."),
            Ok(false) => println!("El título no puede estar vacío."),
            Err(e) => println!("No se pudo renombrar: {}", e),
        }
    }

    async fn delete(&mut self, arg: &str) {
        let target = if arg.is_empty() {
            let store = self.session.store();
            let id = store.lock().await.active_id().map(str::to_string);
            id
        } else {
            self.resolve(arg)
        };
        let Some(id) = target else {
            println!("Chat no encontrado: {}", arg);
            return;
        };

        let store = self.session.store();
        let mut store = store.lock().await;
        match store.delete(&id).await {
            Ok(()) => {
                self.listed.retain(|l| l != &id);
                println!("Eliminado. Esta acción no se puede deshacer.");
            }
            Err(e) => println!("No se pudo eliminar: {}", e),
        }
    }

    /// Resolve a `/list` number or a raw conversation id.
    fn resolve(&self, arg: &str) -> Option<String> {
        if let Ok(n) = arg.parse::<usize>() {
            return self.listed.get(n.checked_sub(1)?).cloned();
        }
        if arg.is_empty() {
            None
        } else {
            Some(arg.to_string())
        }
    }
}

fn prompt_marker() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_error(error: &SendError) {
    if error.is_cancelled() {
        return;
    }
    println!("[{}] {}", error.headline(), error);
    if let Some(status) = error.status() {
        println!("HTTP {}", status);
    }
    if error.offers_retry() {
        println!("Escribe /retry para reintentar.");
    }
}

fn print_help() {
    println!("/new            — empezar un chat nuevo");
    println!("/list [término] — listar chats (filtrados por título)");
    println!("/open <n|id>    — abrir un chat de la lista");
    println!("/rename <t>     — renombrar el chat activo");
    println!("/delete [n|id]  — eliminar un chat (el activo por defecto)");
    println!("/retry          — reenviar el último prompt");
    println!("/quit           — salir");
}
