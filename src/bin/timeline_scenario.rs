// ==========================================
// 工位换型排程引擎 - 场景回放工具
// ==========================================
// 用法: timeline_scenario <scenario.json> [--json-log]
// 输入: 工位 / 产品 / 定额 / 工序 / 订单 / 日历 / 按顺序保存的任务
// 输出: 每次保存的报告 + 最终时间线 (JSON, stdout)
// ==========================================

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use workstation_changeover::engine::{
    CollectingValidationSink, DateViolation, InMemoryCatalog, SaveReport, ShiftCalendar,
};
use workstation_changeover::logging;
use workstation_changeover::repository::{InMemoryTimelineRepository, OrderRepository};
use workstation_changeover::{
    ChangeoverInstance, ChangeoverNorm, Order, Product, SchedulerConfig, Task, TechnologyOperation,
    TimelineRepositories, TimelineService, Workstation,
};

#[derive(Debug, Deserialize)]
struct ScenarioInput {
    #[serde(default)]
    config: SchedulerConfig,
    #[serde(default)]
    workstations: Vec<Workstation>,
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    norms: Vec<ChangeoverNorm>,
    #[serde(default)]
    operations: Vec<TechnologyOperation>,
    #[serde(default)]
    orders: Vec<Order>,
    #[serde(default)]
    calendar: ShiftCalendar,
    #[serde(default)]
    steps: Vec<ScenarioStep>,
}

/// 回放步骤
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScenarioStep {
    Save { task: Task },
    Reschedule { task_id: String },
    Delete { task_id: String },
}

#[derive(Debug, Serialize)]
struct ScenarioOutput {
    reports: Vec<SaveReport>,
    violations: Vec<DateViolation>,
    tasks: Vec<Task>,
    changeovers: Vec<ChangeoverInstance>,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        bail!("用法: timeline_scenario <scenario.json> [--json-log]");
    };
    if args.iter().any(|a| a == "--json-log") {
        logging::init_json();
    } else {
        logging::init();
    }

    let raw = std::fs::read_to_string(path).with_context(|| format!("读取场景文件失败: {}", path))?;
    let input: ScenarioInput = serde_json::from_str(&raw).with_context(|| format!("解析场景文件失败: {}", path))?;

    let output = run(input)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(input: ScenarioInput) -> Result<ScenarioOutput> {
    let repo = Arc::new(InMemoryTimelineRepository::new());
    for order in &input.orders {
        repo.save_order(order)?;
    }

    let mut catalog = InMemoryCatalog::new();
    for ws in input.workstations {
        catalog.add_workstation(ws);
    }
    for product in input.products {
        catalog.add_product(product);
    }
    for operation in input.operations {
        catalog.add_operation(operation);
    }
    for norm in input.norms {
        catalog.add_norm(norm);
    }

    let sink = Arc::new(CollectingValidationSink::new());
    let deps = TimelineRepositories::new(repo.clone(), Arc::new(catalog), Arc::new(input.calendar));
    let service = TimelineService::new(deps, input.config).with_validation_sink(sink.clone());

    let mut reports = Vec::with_capacity(input.steps.len());
    for step in input.steps {
        let report = match step {
            ScenarioStep::Save { task } => {
                let id = task.id.clone();
                service.save_task(task).with_context(|| format!("保存任务失败: {}", id))?
            }
            ScenarioStep::Reschedule { task_id } => service
                .reschedule_task(&task_id)
                .with_context(|| format!("重排任务失败: {}", task_id))?,
            ScenarioStep::Delete { task_id } => service
                .delete_task(&task_id)
                .with_context(|| format!("删除任务失败: {}", task_id))?,
        };
        reports.push(report);
    }

    let mut tasks = repo.all_tasks()?;
    tasks.sort_by(|a, b| (&a.workstation_id, a.start, &a.id).cmp(&(&b.workstation_id, b.start, &b.id)));
    let mut changeovers = repo.all_changeovers()?;
    changeovers.sort_by(|a, b| (&a.current_task_id, a.start, &a.id).cmp(&(&b.current_task_id, b.start, &b.id)));

    Ok(ScenarioOutput {
        reports,
        violations: sink.take(),
        tasks,
        changeovers,
    })
}
