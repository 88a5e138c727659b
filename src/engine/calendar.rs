// ==========================================
// 工位换型排程引擎 - 工作日历
// ==========================================
// 职责: 最近工作时刻 / 按工作时间累加时长
// 模型: 产线日历 = 每日班次窗口 - 停机时段
//       停机时段优先于班次窗口
// 区间: 均为半开区间 [start, end)
// ==========================================

use crate::engine::error::{EngineError, EngineResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 向后搜索工作时间的最大天数
pub const SEARCH_HORIZON_DAYS: i64 = 366;

// ==========================================
// WorkingCalendar - 工作日历接口
// ==========================================
pub trait WorkingCalendar: Send + Sync {
    /// 不早于 instant 的最近工作时刻
    fn nearest_working(&self, workstation_id: &str, instant: NaiveDateTime) -> EngineResult<NaiveDateTime>;

    /// 从 start 起累计 secs 秒工作时间后的时刻
    fn add_working_duration(
        &self,
        workstation_id: &str,
        start: NaiveDateTime,
        secs: i64,
    ) -> EngineResult<NaiveDateTime>;
}

/// 全天工作的日历
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysWorkingCalendar;

impl WorkingCalendar for AlwaysWorkingCalendar {
    fn nearest_working(&self, _workstation_id: &str, instant: NaiveDateTime) -> EngineResult<NaiveDateTime> {
        Ok(instant)
    }

    fn add_working_duration(
        &self,
        _workstation_id: &str,
        start: NaiveDateTime,
        secs: i64,
    ) -> EngineResult<NaiveDateTime> {
        Ok(start + Duration::seconds(secs.max(0)))
    }
}

// ==========================================
// 班次 / 停机 / 产线日历
// ==========================================

/// 每日班次窗口；end <= start 表示跨零点，start == end 表示全天
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
    #[serde(default)]
    pub weekdays: Vec<Weekday>, // 为空表示每天
}

impl Shift {
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            weekdays: Vec::new(),
        }
    }

    pub fn on_days(mut self, weekdays: &[Weekday]) -> Self {
        self.weekdays = weekdays.to_vec();
        self
    }

    fn applies_on(&self, day: NaiveDate) -> bool {
        self.weekdays.is_empty() || self.weekdays.contains(&day.weekday())
    }

    /// 该班次在指定日期开始的窗口
    fn window_on(&self, day: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
        if !self.applies_on(day) {
            return None;
        }
        let from = day.and_time(self.start);
        let to = if self.end > self.start {
            day.and_time(self.end)
        } else {
            (day + Duration::days(1)).and_time(self.end)
        };
        Some((from, to))
    }
}

/// 停机时段 [from, to)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedPeriod {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineCalendar {
    #[serde(default)]
    pub shifts: Vec<Shift>,
    #[serde(default)]
    pub blocked_periods: Vec<BlockedPeriod>,
}

impl LineCalendar {
    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shifts.push(shift);
        self
    }

    pub fn with_blocked(mut self, from: NaiveDateTime, to: NaiveDateTime) -> Self {
        self.blocked_periods.push(BlockedPeriod { from, to, reason: None });
        self
    }

    /// 某日开始的工作窗口（已扣除停机，按开始时间排序）
    fn windows_starting_on(&self, day: NaiveDate) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let mut windows: Vec<(NaiveDateTime, NaiveDateTime)> = if self.shifts.is_empty() {
            vec![(day.and_time(NaiveTime::MIN), (day + Duration::days(1)).and_time(NaiveTime::MIN))]
        } else {
            self.shifts.iter().filter_map(|s| s.window_on(day)).collect()
        };
        windows.sort();

        windows
            .into_iter()
            .flat_map(|w| self.subtract_blocked(w))
            .collect()
    }

    fn subtract_blocked(&self, window: (NaiveDateTime, NaiveDateTime)) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let mut pieces = vec![window];
        for bp in &self.blocked_periods {
            pieces = pieces
                .into_iter()
                .flat_map(|(from, to)| {
                    if bp.to <= from || bp.from >= to {
                        return vec![(from, to)];
                    }
                    let mut rest = Vec::with_capacity(2);
                    if bp.from > from {
                        rest.push((from, bp.from));
                    }
                    if bp.to < to {
                        rest.push((bp.to, to));
                    }
                    rest
                })
                .collect();
        }
        pieces
    }

    /// 按时间顺序遍历 instant 之后仍有效的工作窗口
    fn for_each_window<F>(&self, instant: NaiveDateTime, mut visit: F) -> bool
    where
        F: FnMut(NaiveDateTime, NaiveDateTime) -> bool,
    {
        // 前一天的跨零点班次可能覆盖 instant
        let first_day = instant.date() - Duration::days(1);
        for offset in 0..=SEARCH_HORIZON_DAYS {
            let day = first_day + Duration::days(offset);
            for (from, to) in self.windows_starting_on(day) {
                if to <= instant {
                    continue;
                }
                if visit(from, to) {
                    return true;
                }
            }
        }
        false
    }

    pub fn nearest_working(&self, instant: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut found = None;
        self.for_each_window(instant, |from, _to| {
            found = Some(from.max(instant));
            true
        });
        found
    }

    pub fn add_working_duration(&self, start: NaiveDateTime, secs: i64) -> Option<NaiveDateTime> {
        if secs <= 0 {
            return Some(start);
        }
        let mut remaining = Duration::seconds(secs);
        let mut cursor = start;
        let mut finish = None;
        self.for_each_window(start, |from, to| {
            if to <= cursor {
                return false;
            }
            let begin = from.max(cursor);
            let available = to - begin;
            if remaining <= available {
                finish = Some(begin + remaining);
                return true;
            }
            remaining = remaining - available;
            cursor = to;
            false
        });
        finish
    }
}

// ==========================================
// ShiftCalendar - 按产线绑定的班次日历
// ==========================================
/// 未绑定产线的工位视为全天工作
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftCalendar {
    #[serde(default)]
    lines: HashMap<String, LineCalendar>,
    #[serde(default)]
    workstation_lines: HashMap<String, String>,
}

impl ShiftCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_line(mut self, line_id: impl Into<String>, calendar: LineCalendar) -> Self {
        self.lines.insert(line_id.into(), calendar);
        self
    }

    /// 绑定工位到产线
    pub fn assign(mut self, workstation_id: impl Into<String>, line_id: impl Into<String>) -> Self {
        self.workstation_lines.insert(workstation_id.into(), line_id.into());
        self
    }

    fn line_for(&self, workstation_id: &str) -> Option<&LineCalendar> {
        self.workstation_lines
            .get(workstation_id)
            .and_then(|line| self.lines.get(line))
    }
}

impl WorkingCalendar for ShiftCalendar {
    fn nearest_working(&self, workstation_id: &str, instant: NaiveDateTime) -> EngineResult<NaiveDateTime> {
        match self.line_for(workstation_id) {
            Some(line) => line.nearest_working(instant).ok_or_else(|| {
                EngineError::Calendar(format!(
                    "工位 {} 在 {} 之后 {} 天内无工作时间",
                    workstation_id, instant, SEARCH_HORIZON_DAYS
                ))
            }),
            None => Ok(instant),
        }
    }

    fn add_working_duration(
        &self,
        workstation_id: &str,
        start: NaiveDateTime,
        secs: i64,
    ) -> EngineResult<NaiveDateTime> {
        match self.line_for(workstation_id) {
            Some(line) => line.add_working_duration(start, secs).ok_or_else(|| {
                EngineError::Calendar(format!(
                    "工位 {} 从 {} 起无法累计 {} 秒工作时间",
                    workstation_id, start, secs
                ))
            }),
            None => AlwaysWorkingCalendar.add_working_duration(workstation_id, start, secs),
        }
    }
}
