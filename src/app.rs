use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chat::{ChatError, Draft, Message, SyncController, SyncPhase};
use crate::config::Config;
use crate::identity::random_nickname;
use crate::input::TextField;
use crate::store::MessageStore;

const MAX_STATUS_MESSAGES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Composing,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeField {
    Text,
    Nickname,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub compose_field: ComposeField,
    pub text: TextField,
    pub nickname: TextField,
    pub default_nickname: String,

    pub sync: SyncController,
    pub status_messages: Vec<String>,
    status_rx: mpsc::UnboundedReceiver<String>,
}

impl App {
    pub async fn new(config: &Config, store: Arc<dyn MessageStore>) -> Result<Self> {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let default_nickname = config.nickname.clone().unwrap_or_else(random_nickname);

        let sync = SyncController::new(store, &config.collection, &config.date_format, status_tx);

        let mut app = Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            compose_field: ComposeField::Text,
            text: TextField::new(),
            nickname: TextField::with_value(&default_nickname),
            default_nickname,

            sync,
            status_messages: Vec::new(),
            status_rx,
        };

        app.sync.start().await?;
        info!("live query on {} is running", app.sync.collection());
        app.add_status_message(format!(
            "Joined {} as {} ({} messages)",
            app.sync.collection(),
            app.default_nickname,
            app.sync.cache().len()
        ));

        Ok(app)
    }

    pub fn handle_input(&mut self, event: Event) -> Result<()> {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key_event(key);
            }
        }
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match self.input_mode {
            InputMode::Normal => match key.code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                }
                KeyCode::Char('i') => {
                    self.input_mode = InputMode::Composing;
                }
                KeyCode::Char('s') => self.send_draft(),
                KeyCode::Char('d') => self.delete_selected(),
                KeyCode::Char('e') => self.edit_selected(),
                KeyCode::Up => {
                    let (cache, view) = self.sync.view_parts();
                    view.select_prev(cache);
                }
                KeyCode::Down => {
                    let (cache, view) = self.sync.view_parts();
                    view.select_next(cache);
                }
                KeyCode::PageUp => {
                    self.sync.view_parts().1.scroll_up(10);
                }
                KeyCode::PageDown => {
                    self.sync.view_parts().1.scroll_down(10);
                }
                KeyCode::Esc => {
                    self.sync.view_parts().1.clear_selection();
                }
                _ => {}
            },
            InputMode::Composing => match key.code {
                KeyCode::Enter => self.send_draft(),
                KeyCode::Tab | KeyCode::BackTab => {
                    self.compose_field = match self.compose_field {
                        ComposeField::Text => ComposeField::Nickname,
                        ComposeField::Nickname => ComposeField::Text,
                    };
                }
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                }
                _ => {
                    self.focused_field().handle_key(key);
                }
            },
            InputMode::Editing => match key.code {
                KeyCode::Enter => match self.sync.save_edit() {
                    Ok(_) => self.input_mode = InputMode::Normal,
                    Err(ChatError::EmptyMessage) => {
                        self.add_status_message("Message text cannot be empty".to_string());
                    }
                    Err(e) => {
                        self.input_mode = InputMode::Normal;
                        self.add_status_message(format!("Edit failed: {}", e));
                    }
                },
                KeyCode::Esc => {
                    self.input_mode = InputMode::Normal;
                    let _ = self.sync.close_edit();
                }
                _ => {
                    if let Some(overlay) = self.sync.overlay_mut() {
                        overlay.field.handle_key(key);
                    }
                }
            },
        }

        // The overlay can also close underneath us when its message is deleted
        if self.input_mode == InputMode::Editing && self.sync.overlay().is_none() {
            self.input_mode = InputMode::Normal;
        }
    }

    fn focused_field(&mut self) -> &mut TextField {
        match self.compose_field {
            ComposeField::Text => &mut self.text,
            ComposeField::Nickname => &mut self.nickname,
        }
    }

    /// Send whatever is in the text and nickname fields.
    fn send_draft(&mut self) {
        match Draft::new(self.text.value(), self.nickname.value(), &self.default_nickname) {
            Ok(draft) => {
                debug!("sending draft from {}", draft.username);
                // The call runs on its own task; failures come back as status lines
                let _ = self.sync.submit(draft);
                self.text.clear();
            }
            Err(ChatError::EmptyMessage) => {}
            Err(e) => self.add_status_message(e.to_string()),
        }
    }

    fn delete_selected(&mut self) {
        let Some(id) = self.sync.view().selected().cloned() else {
            self.add_status_message("Select a message with Up/Down first".to_string());
            return;
        };
        if let Err(e) = self.sync.delete(&id) {
            self.add_status_message(format!("Delete failed: {}", e));
        }
    }

    fn edit_selected(&mut self) {
        let Some(id) = self.sync.view().selected().cloned() else {
            self.add_status_message("Select a message with Up/Down first".to_string());
            return;
        };
        match self.sync.open_edit(&id) {
            Ok(_) => self.input_mode = InputMode::Editing,
            Err(e) => self.add_status_message(format!("Cannot edit: {}", e)),
        }
    }

    pub fn add_status_message(&mut self, message: String) {
        self.status_messages.push(format!(
            "[{}] {}",
            chrono::Local::now().format("%H:%M:%S"),
            message
        ));

        if self.status_messages.len() > MAX_STATUS_MESSAGES {
            self.status_messages.remove(0);
        }
    }

    pub fn on_tick(&mut self) -> Result<()> {
        self.sync.poll();
        if self.input_mode == InputMode::Editing && self.sync.overlay().is_none() {
            self.input_mode = InputMode::Normal;
        }

        while let Ok(status) = self.status_rx.try_recv() {
            self.add_status_message(status);
        }

        Ok(())
    }

    pub fn is_live(&self) -> bool {
        self.sync.phase() == SyncPhase::Live
    }

    pub fn selected_message(&self) -> Option<&Message> {
        let id = self.sync.view().selected()?;
        self.sync.cache().get(id).ok()
    }

    pub fn get_visible_status_messages(&self, height: usize) -> &[String] {
        let start = self.status_messages.len().saturating_sub(height);
        &self.status_messages[start..]
    }
}
