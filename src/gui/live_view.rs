use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};
use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::acquisition::{Acquisition, AcquisitionStats, StatsSnapshot};
use crate::finger_data::{Fingers, FINGER_COUNT, STATIC_TACTILE_COUNT};
use crate::gui::error::TactileGuiError;
use crate::sample_buffer::SampleBuffer;

// Full scale of the static tactile ADC
const STATIC_FULL_SCALE: u16 = 4095;

const HEAT: [Color; 5] = [
    Color::DarkGray,
    Color::Blue,
    Color::Green,
    Color::Yellow,
    Color::Red,
];

/// Maps a static tactile reading onto the heat palette.
pub fn heat(value: u16) -> Color {
    let level = value.min(STATIC_FULL_SCALE) as usize * HEAT.len() / (STATIC_FULL_SCALE as usize + 1);
    HEAT[level]
}

/// Everything one redraw shows, taken from a snapshot of the view buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// (seconds, value) points of the dynamic tactile sensor, per finger.
    pub dynamic: [Vec<(f64, f64)>; FINGER_COUNT],
    /// The newest frame, if any.
    pub latest: Option<Fingers>,
    /// Visible time span in seconds.
    pub x_bounds: [f64; 2],
    /// Value span shared by the dynamic charts.
    pub y_bounds: [f64; 2],
}

impl ViewState {
    /// Builds the view of `frames`, oldest first. Static readings in
    /// `latest` have `baseline` subtracted.
    pub fn from_frames(frames: &[Fingers], baseline: Option<&Baseline>) -> Self {
        let mut state = ViewState {
            x_bounds: [0.0, 1.0],
            y_bounds: [-1.0, 1.0],
            ..Default::default()
        };
        let (Some(first), Some(last)) = (frames.first(), frames.last()) else {
            return state;
        };

        let (mut lo, mut hi) = (f64::MAX, f64::MIN);
        for frame in frames {
            let t = frame.timestamp as f64 / 1000.0;
            for (series, finger) in state.dynamic.iter_mut().zip(&frame.finger) {
                let v = finger.dynamic_tactile[0] as f64;
                lo = lo.min(v);
                hi = hi.max(v);
                series.push((t, v));
            }
        }

        let t0 = first.timestamp as f64 / 1000.0;
        let t1 = last.timestamp as f64 / 1000.0;
        state.x_bounds = [t0, t1.max(t0 + 0.001)];
        let pad = ((hi - lo) * 0.1).max(1.0);
        state.y_bounds = [lo - pad, hi + pad];

        let mut latest = *last;
        if let Some(baseline) = baseline {
            baseline.apply(&mut latest);
        }
        state.latest = Some(latest);
        state
    }
}

/// Static tactile readings captured at rest, subtracted from what is shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline([[u16; STATIC_TACTILE_COUNT]; FINGER_COUNT]);

impl Baseline {
    /// Captures the static readings of `fingers`.
    pub fn capture(fingers: &Fingers) -> Self {
        let mut values = [[0; STATIC_TACTILE_COUNT]; FINGER_COUNT];
        for (dst, finger) in values.iter_mut().zip(&fingers.finger) {
            *dst = finger.static_tactile;
        }
        Baseline(values)
    }

    /// Subtracts the baseline from the static readings of `fingers`,
    /// clamping at zero.
    pub fn apply(&self, fingers: &mut Fingers) {
        for (base, finger) in self.0.iter().zip(fingers.finger.iter_mut()) {
            for (v, b) in finger.static_tactile.iter_mut().zip(base) {
                *v = v.saturating_sub(*b);
            }
        }
    }
}

struct App {
    view: SampleBuffer<Fingers>,
    stats: Arc<AcquisitionStats>,
    title: String,
    baseline: Option<Baseline>,
    state: ViewState,
    snapshot: StatsSnapshot,
}

impl App {
    fn on_tick(&mut self) {
        let frames = self.view.extract(false);
        self.state = ViewState::from_frames(&frames, self.baseline.as_ref());
        self.snapshot = self.stats.snapshot();
    }

    fn capture_baseline(&mut self) {
        match self.view.peek_back() {
            Some(latest) => {
                log::info!("Static baseline captured at {} ms", latest.timestamp);
                self.baseline = Some(Baseline::capture(&latest));
            }
            None => log::warn!("No frame received yet, baseline not captured"),
        }
    }
}

/// Shows the contents of `view` until the user presses `q` or the
/// acquisition thread ends, in which case its failure is returned.
pub fn live_view(
    acquisition: &mut Acquisition,
    view: SampleBuffer<Fingers>,
    refresh: Duration,
    title: &str,
) -> Result<(), TactileGuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let app = App {
        view,
        stats: acquisition.stats(),
        title: title.to_owned(),
        baseline: None,
        state: ViewState::default(),
        snapshot: StatsSnapshot::default(),
    };
    let res = run_app(&mut terminal, app, acquisition, refresh);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    acquisition: &mut Acquisition,
    tick_rate: Duration,
) -> Result<(), TactileGuiError> {
    let mut last_tick = Instant::now();
    loop {
        if !acquisition.is_running() {
            acquisition.stop()?;
            return Ok(());
        }

        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('b') => app.capture_baseline(),
                        KeyCode::Char('c') => app.baseline = None,
                        _ => {}
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(45),
            Constraint::Min(8),
        ])
        .split(f.size());

    status_line(f, rows[0], app);

    let charts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, FINGER_COUNT as u32); FINGER_COUNT])
        .split(rows[1]);
    let details = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, FINGER_COUNT as u32); FINGER_COUNT])
        .split(rows[2]);

    for finger in 0..FINGER_COUNT {
        dynamic_chart(f, charts[finger], &app.state, finger);
        finger_details(f, details[finger], app.state.latest.as_ref(), finger);
    }
}

fn highlight(text: String) -> Span<'static> {
    Span::styled(
        text,
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )
}

fn status_line(f: &mut Frame, area: Rect, app: &App) {
    let s = &app.snapshot;
    let baseline = if app.baseline.is_some() { "on" } else { "off" };
    let line = Line::from(vec![
        " Rate ".into(),
        highlight(format!("{:.3} KB/s", s.data_rate as f64 / 1000.0)),
        "  Frames ".into(),
        highlight(s.frames.to_string()),
        "  Packets ".into(),
        highlight(s.packets.to_string()),
        "  Rejected ".into(),
        highlight(s.rejected.to_string()),
        "  Baseline ".into(),
        baseline.magenta().bold(),
    ]);
    let help = Line::from(vec![
        " Baseline ".into(),
        "<B>".magenta().bold(),
        " Clear ".into(),
        "<C>".magenta().bold(),
        " Quit ".into(),
        "<Q> ".magenta().bold(),
    ]);
    let block = Block::default()
        .title(highlight(format!(" {} ", app.title)))
        .borders(Borders::ALL);
    let area_split = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(36)])
        .split(block.inner(area));
    f.render_widget(block, area);
    f.render_widget(Paragraph::new(line), area_split[0]);
    f.render_widget(Paragraph::new(help), area_split[1]);
}

fn dynamic_chart(f: &mut Frame, area: Rect, state: &ViewState, finger: usize) {
    let [x0, x1] = state.x_bounds;
    let [y0, y1] = state.y_bounds;
    let chart = Chart::new(vec![Dataset::default()
        .name(format!("D0_{}", finger))
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&state.dynamic[finger])])
    .block(
        Block::default()
            .title(format!(" Finger {} dynamic ", finger))
            .borders(Borders::ALL),
    )
    .x_axis(
        Axis::default()
            .title(Span::styled("s", Style::default().fg(Color::Red)))
            .style(Style::default().fg(Color::White))
            .bounds([x0, x1])
            .labels(vec![
                Span::from(format!("{:.1}", x0)),
                Span::from(format!("{:.1}", x1)),
            ]),
    )
    .y_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([y0, y1])
            .labels(vec![
                Span::from(format!("{:.0}", y0)),
                Span::from(format!("{:.0}", (y0 + y1) / 2.0)),
                Span::from(format!("{:.0}", y1)),
            ]),
    );
    f.render_widget(chart, area);
}

fn finger_details(f: &mut Frame, area: Rect, latest: Option<&Fingers>, finger: usize) {
    let block = Block::default()
        .title(format!(" Finger {} static ", finger))
        .borders(Borders::ALL);
    let Some(data) = latest.map(|l| &l.finger[finger]) else {
        f.render_widget(Paragraph::new("waiting for data...").block(block), area);
        return;
    };

    let mut lines: Vec<Line> = data
        .static_tactile_rows()
        .map(|row| {
            Line::from(
                row.iter()
                    .map(|&v| Span::styled(format!("{:>5}", v), Style::default().fg(heat(v))))
                    .collect::<Vec<_>>(),
            )
        })
        .collect();

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let vector = |name: &'static str, v: &[i16; 3]| {
        Line::from(vec![
            Span::styled(name, bold),
            Span::from(format!("{:>7}{:>7}{:>7}", v[0], v[1], v[2])),
        ])
    };
    lines.push(Line::default());
    lines.push(vector("Acc ", &data.accelerometer));
    lines.push(vector("Gyr ", &data.gyroscope));
    lines.push(vector("Mag ", &data.magnetometer));
    lines.push(Line::from(vec![
        Span::styled("Tmp ", bold),
        Span::from(format!("{:>7}", data.temperature)),
    ]));

    f.render_widget(Paragraph::new(lines).block(block), area);
}
