use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

use crate::domain::CMDMode;

/// One line text prompt used to edit a setting.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize, // in chars, not bytes
    mode: Option<CMDMode>,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct InputResult {
    pub input: String,
    pub mode: Option<CMDMode>,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (KeyCode::Char('u'), KeyModifiers::CONTROL) => {
                self.current_input.clear();
                self.curser_pos = 0;
                self.get()
            }
            (kc, km) => self.key(kc, km),
        }
    }

    /// Starts a new prompt for `mode`, prefilled with the current value.
    pub fn start(&mut self, mode: CMDMode, value: &str) -> InputResult {
        self.clear();
        self.mode = Some(mode);
        self.current_input = value.to_string();
        self.curser_pos = value.chars().count();
        trace!("Prompt {:?} started with \"{value}\"", mode);
        self.get()
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            input: self.current_input.clone(),
            mode: self.mode,
            finished: self.finished,
            canceled: self.canceled,
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.mode = None;
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let idx = self.getbytepos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            let idx = self.getbytepos();
            self.current_input.remove(idx);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, _modifier: KeyModifiers) -> InputResult {
        if let Some(chr) = code.as_char() {
            self.current_input.insert(self.getbytepos(), chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(inputter: &mut Inputter, text: &str) {
        for c in text.chars() {
            press(inputter, KeyCode::Char(c));
        }
    }

    #[test]
    fn edits_in_the_middle_of_multibyte_text() {
        let mut inputter = Inputter::default();
        inputter.start(CMDMode::CheckChars, "é;");
        press(&mut inputter, KeyCode::Left);
        type_str(&mut inputter, " |");
        assert_eq!(inputter.get().input, "é |;");
        press(&mut inputter, KeyCode::Backspace);
        assert_eq!(inputter.get().input, "é ;");
        press(&mut inputter, KeyCode::Home);
        press(&mut inputter, KeyCode::Delete);
        assert_eq!(inputter.get().input, " ;");
    }

    #[test]
    fn enter_finishes_and_escape_cancels() {
        let mut inputter = Inputter::default();
        inputter.start(CMDMode::Separator, ",");
        type_str(&mut inputter, ";");
        let result = press(&mut inputter, KeyCode::Enter);
        assert!(result.finished && !result.canceled);
        assert_eq!(result.input, ",;");
        assert_eq!(result.mode, Some(CMDMode::Separator));

        inputter.start(CMDMode::Separator, ",");
        let result = press(&mut inputter, KeyCode::Esc);
        assert!(result.finished && result.canceled);
    }

    #[test]
    fn ctrl_u_clears_the_line() {
        let mut inputter = Inputter::default();
        inputter.start(CMDMode::FilePath, "/tmp/data.csv");
        let result = inputter.read(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert_eq!(result.input, "");
        assert_eq!(result.curser_pos, 0);
    }
}
