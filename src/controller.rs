use std::time::Duration;
use tracing::trace;

use crate::domain::{CCConfig, CCError, Message};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &CCConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Waits at most `event_poll_time` for an event. Returning `None` on a
    /// timeout gives the loop a chance to pick up finished jobs.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, CCError> {
        if event::poll(Duration::from_millis(self.event_poll_time))? {
            match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        return Ok(Some(Message::RawKey(key)));
                    }
                    return Ok(self.handle_key(key));
                }
                Event::Resize(width, height) => {
                    return Ok(Some(Message::Resize(width as usize, height as usize)));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Tab, _) => Some(Message::NextTab),
            (KeyCode::BackTab, _) => Some(Message::PrevTab),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Char('o'), _) => Some(Message::ChooseFile),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('d'), _) => Some(Message::Drop),
            (KeyCode::Char('a'), _) => Some(Message::Analyze),
            (KeyCode::Char('c'), _) => Some(Message::EditCheck),
            (KeyCode::Char('e'), _) => Some(Message::EditEncoding),
            (KeyCode::Char('s'), _) => Some(Message::EditSeparator),
            (KeyCode::Char('h'), _) => Some(Message::ToggleHeader),
            (KeyCode::Char('u'), _) => Some(Message::ToggleUnnamed),
            (KeyCode::Char('l'), _) => Some(Message::ToggleLinebreaks),
            (KeyCode::Char('w'), _) => Some(Message::EditSwapOut),
            (KeyCode::Char('i'), _) => Some(Message::EditSwapIn),
            (KeyCode::Char('p'), _) => Some(Message::EditExportSeparator),
            (KeyCode::Char('g'), _) => Some(Message::EditExportDir),
            (KeyCode::Char('x'), _) => Some(Message::Export),
            (KeyCode::Char('y'), _) => Some(Message::CopyRow),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
