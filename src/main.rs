use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lbsim_core::config::{SimConfig, StrategyKind};

mod report;
mod scenario;
mod workload;

use scenario::{Scenario, ScenarioRunner};

fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("lbsim")
        .version("1.0.0")
        .about("云任务放置负载均衡仿真系统")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("SCENARIO")
                .help("仿真场景")
                .value_parser(["baseline", "vm-failure", "lb-failure", "work-stealing"])
                .default_value("baseline"),
        )
        .arg(
            Arg::new("strategy")
                .long("strategy")
                .value_name("STRATEGY")
                .help("放置策略 (覆盖配置文件)")
                .value_parser(["sbdlb", "round_robin", "weighted_round_robin", "honey_bee"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径 (缺省使用内置默认值)"),
        )
        .arg(
            Arg::new("tasks")
                .short('n')
                .long("tasks")
                .value_name("COUNT")
                .help("每个区域的任务数")
                .value_parser(clap::value_parser!(usize))
                .default_value("200"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("负载生成的随机种子")
                .value_parser(clap::value_parser!(u64))
                .default_value("42"),
        )
        .arg(
            Arg::new("horizon")
                .long("horizon")
                .value_name("SECONDS")
                .help("仿真时间上限 (虚拟秒)")
                .value_parser(clap::value_parser!(f64))
                .default_value("100000"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let scenario_str = matches.get_one::<String>("scenario").unwrap();
    let config_path = matches.get_one::<String>("config");
    let tasks = *matches.get_one::<usize>("tasks").unwrap();
    let seed = *matches.get_one::<u64>("seed").unwrap();
    let horizon = *matches.get_one::<f64>("horizon").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_format = matches.get_one::<String>("log-format").unwrap();

    // 初始化日志系统
    init_logging(log_level, log_format)?;

    info!("启动云任务放置仿真");
    info!("仿真场景: {scenario_str}");

    // 加载配置
    let mut config = match config_path {
        Some(path) => {
            info!("配置文件: {path}");
            SimConfig::load(path).with_context(|| format!("加载配置文件失败: {path}"))?
        }
        None => SimConfig::default(),
    };

    // 命令行指定的策略覆盖配置文件
    if let Some(strategy) = matches.get_one::<String>("strategy") {
        config.strategy = strategy
            .parse::<StrategyKind>()
            .map_err(|e| anyhow::anyhow!("无效的放置策略: {e}"))?;
    }
    info!("放置策略: {}", config.strategy.as_str());

    let scenario = scenario_str
        .parse::<Scenario>()
        .map_err(|e| anyhow::anyhow!("无效的仿真场景: {e}"))?;

    // 构建并运行仿真，汇总报表打印到标准输出
    let runner = ScenarioRunner::new(scenario, config, tasks, seed, horizon);
    let summary = runner.run()?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!("仿真结束");
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}
