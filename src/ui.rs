use ratatui::{
    Frame,
    layout::{Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span, Text},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, TableState, Tabs, Wrap},
};

use crate::domain::CCConfig;
use crate::model::{Model, Setting, Tab, UIData};

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];
const NULL_CELL: &str = "∅";

pub struct TableUI {
    spinner_idx: usize,
    results_state: TableState,
    preview_state: TableState,
}

impl TableUI {
    pub fn new(_cfg: &CCConfig) -> Self {
        Self {
            spinner_idx: 0,
            results_state: TableState::default(),
            preview_state: TableState::default(),
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [tabs_area, body_area, status_area] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        self.render_tabs(uidata, frame, tabs_area);
        match uidata.tab {
            Tab::MAIN => self.render_main(uidata, frame, body_area),
            Tab::PREVIEW => self.render_preview(uidata, frame, body_area),
            Tab::EXPORT => self.render_export(uidata, frame, body_area),
        }
        self.render_status(uidata, frame, status_area);

        if uidata.show_popup {
            self.render_popup(uidata, frame);
        }
    }

    fn render_tabs(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let titles = Tab::ALL.iter().map(|t| format!(" {} ", t.title()));
        let tabs = Tabs::new(titles)
            .block(
                Block::bordered()
                    .title(Line::from(" charcheck ".bold()).centered())
                    .border_set(border::THICK),
            )
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            .select(uidata.tab.index());
        frame.render_widget(tabs, area);
    }

    fn settings_lines(settings: &[Setting]) -> Vec<Line<'_>> {
        let label_width = settings.iter().map(|s| s.label.len()).max().unwrap_or(0);
        settings
            .iter()
            .map(|s| {
                Line::from(vec![
                    format!("<{}> ", s.key).blue().bold(),
                    format!("{:<width$} : ", s.label, width = label_width).into(),
                    s.value.clone().yellow(),
                ])
            })
            .collect()
    }

    fn render_main(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let [file_area, settings_area, results_area] = Layout::vertical([
            Constraint::Length(4),
            Constraint::Length(8),
            Constraint::Min(3),
        ])
        .areas(area);

        let file_text = Text::from(vec![
            Line::from(vec![
                "<o> ".blue().bold(),
                uidata.file_label.clone().yellow(),
            ]),
            Line::from(uidata.file_info.clone()),
        ]);
        let file_block = Block::bordered()
            .title(" File ")
            .title_bottom(
                Line::from(vec![
                    " Reload ".into(),
                    "<r>".blue().bold(),
                    " Drop ".into(),
                    "<d> ".blue().bold(),
                ])
                .centered(),
            );
        frame.render_widget(Paragraph::new(file_text).block(file_block), file_area);

        let settings = Paragraph::new(Self::settings_lines(&uidata.settings))
            .block(Block::bordered().title(" Settings "));
        frame.render_widget(settings, settings_area);

        let header = Row::new(vec!["Column", "Count", "Percentage"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows = uidata.results.iter().map(|[column, count, percentage]| {
            Row::new(vec![
                Cell::from(column.as_str()),
                Cell::from(Line::from(count.as_str()).right_aligned()),
                Cell::from(Line::from(percentage.as_str()).right_aligned()),
            ])
        });
        let widths = [
            Constraint::Fill(1),
            Constraint::Length(10),
            Constraint::Length(12),
        ];
        let table = Table::new(rows, widths)
            .header(header)
            .block(
                Block::bordered().title(uidata.results_title.clone()).title_bottom(
                    Line::from(vec![
                        " Analyze ".into(),
                        "<a>".blue().bold(),
                        " Preview ".into(),
                        "<Enter> ".blue().bold(),
                    ])
                    .centered(),
                ),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        if uidata.results.is_empty() {
            self.results_state.select(None);
        } else {
            self.results_state.select(Some(uidata.selected_result));
        }
        frame.render_stateful_widget(table, results_area, &mut self.results_state);
    }

    fn render_preview(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let Some(preview) = &uidata.preview else {
            let hint = Paragraph::new("Select a column on the Main tab and press <Enter>.")
                .centered()
                .block(Block::bordered().title(" Data Preview "));
            frame.render_widget(hint, area);
            return;
        };

        let header = Row::new(
            preview
                .headers
                .iter()
                .map(|h| {
                    let cell = Cell::from(h.as_str());
                    if *h == preview.column {
                        cell.style(Style::default().fg(Color::Yellow))
                    } else {
                        cell
                    }
                })
                .collect::<Vec<Cell>>(),
        )
        .style(Style::default().add_modifier(Modifier::BOLD));
        let rows = preview.rows.iter().map(|row| {
            Row::new(
                row.iter()
                    .map(|value| Cell::from(value.as_deref().unwrap_or(NULL_CELL)))
                    .collect::<Vec<Cell>>(),
            )
        });
        let widths = vec![Constraint::Fill(1); preview.headers.len().max(1)];
        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .block(
                Block::bordered()
                    .title(format!(" Rows matching in \"{}\" ", preview.column))
                    .title_bottom(
                        Line::from(vec![" Copy row ".into(), "<y> ".blue().bold()]).centered(),
                    ),
            )
            .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        if preview.rows.is_empty() {
            self.preview_state.select(None);
        } else {
            self.preview_state.select(Some(uidata.selected_preview_row));
        }
        frame.render_stateful_widget(table, area, &mut self.preview_state);
    }

    fn render_export(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut lines = Self::settings_lines(&uidata.export_settings);
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            "<x> ".blue().bold(),
            "Swap string and save file".into(),
        ]));
        let export = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(" Export "));
        frame.render_widget(export, area);
    }

    fn render_status(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if let Some(input) = &uidata.cmdinput {
            let label = input.mode.map(|m| m.label()).unwrap_or("Input");
            let prompt = format!("{label}: ");
            let line = Line::from(vec![prompt.clone().bold(), Span::raw(input.input.clone())]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + input.curser_pos) as u16;
            frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let mut spans = Vec::new();
        if let Some(job) = uidata.busy {
            self.spinner_idx = (self.spinner_idx + 1) % SPINNER.len();
            spans.push(format!("{} {job} running ", SPINNER[self.spinner_idx]).magenta().bold());
        }
        spans.push(Span::raw(uidata.status_message.clone()));
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = popup_area(frame.area(), 70, 80);
        let popup = Paragraph::new(uidata.popup_message.as_str())
            .wrap(Wrap { trim: false })
            .block(
                Block::bordered()
                    .title(Line::from(" Help ".bold()).centered())
                    .title_bottom(Line::from(" Close <Esc> ").centered())
                    .border_set(border::THICK),
            );
        frame.render_widget(Clear, area);
        frame.render_widget(popup, area);
    }
}

fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(percent_x) / 100) as u16;
    let height = (u32::from(area.height) * u32::from(percent_y) / 100) as u16;
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{LoadOptions, TableHandler};
    use ratatui::{Terminal, backend::TestBackend};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|line| line.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<String>>()
            .join("\n")
    }

    #[test]
    fn renders_main_tab_without_file() {
        let config = CCConfig::default();
        let handler =
            TableHandler::new(LoadOptions::from_config(&config), &config.check_input).unwrap();
        let model = Model::init(&config, handler, 100, 30);
        let mut ui = TableUI::new(&config);
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|f| ui.draw(&model, f)).unwrap();
        let text = buffer_text(&terminal);
        assert!(text.contains("--no file chosen--"));
        assert!(text.contains("Characters to check for"));
        assert!(text.contains("Data Preview"));
    }

    #[test]
    fn popup_stays_inside_area() {
        let area = Rect::new(0, 0, 80, 24);
        let popup = popup_area(area, 70, 80);
        assert!(popup.right() <= area.right());
        assert!(popup.bottom() <= area.bottom());
        assert_eq!(popup.width, 56);

        let wide = Rect::new(0, 0, 2000, 500);
        let popup = popup_area(wide, 70, 80);
        assert_eq!(popup.width, 1400);
        assert_eq!(popup.height, 400);
        assert!(popup.right() <= wide.right());
    }
}
