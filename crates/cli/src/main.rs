#![forbid(unsafe_code)]

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use infrascope_api::{ApiConfig, DataSource, HttpApi, InfraApi, LogRecord, Series};
use infrascope_core::columns::{columns_for, grouped_columns_for, render_grouped_row, render_row, ColumnSpec};
use infrascope_core::filters::{describe, parse_expr};
use infrascope_core::{AttributeKey, FilterTree, K8sCategory, OrderBy, TimeRange};
use infrascope_store::{DetailDrawer, DrawerView, KeysetPager, ListOutcome, ListView, ViewState};

#[derive(Parser, Debug)]
#[command(name = "infrascopectl", version, about = "Kubernetes infra-monitoring lists from the terminal")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Backend base URL
    #[arg(long = "url", global = true, env = "INFRASCOPE_URL")]
    url: Option<String>,

    /// API key sent with every request
    #[arg(long = "token", global = true, env = "INFRASCOPE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Relative time range ending now, e.g. 15m, 6h, 2d
    #[arg(long = "since", global = true, default_value = "30m")]
    since: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Args, Debug, Clone)]
struct ListArgs {
    /// Entity category: pods, nodes, namespaces, clusters, deployments, statefulsets, daemonsets, jobs, volumes
    category: String,
    /// Filter expression, e.g. k8s_namespace_name=prod (repeatable)
    #[arg(short = 'f', long = "filter")]
    filters: Vec<String>,
    /// Group by a dimension (repeatable)
    #[arg(long = "group-by")]
    group_by: Vec<String>,
    /// Sort column, optionally with direction: cpu:asc
    #[arg(long = "order-by")]
    order_by: Option<String>,
    #[arg(long = "page", default_value_t = 1)]
    page: u32,
    #[arg(long = "page-size")]
    page_size: Option<u32>,
    /// Start from a shared view-state query string
    #[arg(long = "state")]
    state: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List entities of a category
    Ls(ListArgs),
    /// Expand one group row of a grouped list
    Drill {
        #[command(flatten)]
        list: ListArgs,
        /// Index of the group row to expand
        #[arg(long = "row", default_value_t = 0)]
        row: usize,
        /// Replace the list with the group's members
        #[arg(long = "view-all", action = ArgAction::SetTrue)]
        view_all: bool,
    },
    /// Open the detail drawer for one row
    Drawer {
        #[command(flatten)]
        list: ListArgs,
        #[arg(long = "row", default_value_t = 0)]
        row: usize,
        /// metrics, logs, traces or events
        #[arg(long = "view", default_value = "metrics")]
        view: String,
        /// Extra filter for the selected sub-view (repeatable)
        #[arg(long = "where")]
        sub_filters: Vec<String>,
        /// Pages to walk with the keyset cursor (logs and events)
        #[arg(long = "pages", default_value_t = 1)]
        pages: u32,
    },
    /// Show the dimensions a category can be grouped by
    Keys { category: String },
    /// Decode a shared view-state query string
    State {
        query: String,
        /// Fail on malformed parameters instead of ignoring them
        #[arg(long = "strict", action = ArgAction::SetTrue)]
        strict: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("INFRASCOPE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("INFRASCOPE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid INFRASCOPE_METRICS_ADDR; expected host:port");
        }
    }
}

/// `15m`, `6h`, `2d`, `90s`; a bare number is minutes.
fn parse_since(s: &str) -> Result<chrono::Duration> {
    let s = s.trim();
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => s.split_at(i),
        None => (s, "m"),
    };
    let n: i64 = num.parse().with_context(|| format!("invalid time range: {}", s))?;
    let d = match unit {
        "s" => chrono::Duration::seconds(n),
        "m" => chrono::Duration::minutes(n),
        "h" => chrono::Duration::hours(n),
        "d" => chrono::Duration::days(n),
        "w" => chrono::Duration::weeks(n),
        other => bail!("invalid time unit {:?} in {}", other, s),
    };
    if n <= 0 {
        bail!("time range must be positive: {}", s);
    }
    Ok(d)
}

fn api_config(cli: &Cli) -> ApiConfig {
    let mut cfg = ApiConfig::from_env();
    if let Some(url) = &cli.url {
        cfg.base_url = url.clone();
    }
    if cli.token.is_some() {
        cfg.token = cli.token.clone();
    }
    cfg
}

fn parse_filters(exprs: &[String]) -> Result<Vec<infrascope_core::FilterItem>> {
    exprs.iter().map(|e| parse_expr(e).map_err(anyhow::Error::from)).collect()
}

/// Build the list view from flags (and an optional shared state) and wait for data.
async fn open_list(api: Arc<dyn InfraApi>, cfg: &ApiConfig, time: TimeRange, args: &ListArgs) -> Result<ListView> {
    let category = K8sCategory::from_str(&args.category)?;
    let mut state = args.state.as_deref().map(ViewState::decode).unwrap_or_default();
    state.category = Some(category);
    if !args.filters.is_empty() {
        state.filters = Some(FilterTree::new(parse_filters(&args.filters)?));
    }
    if let Some(ob) = &args.order_by {
        state.order_by = Some(OrderBy::from_str(ob)?);
    }
    if args.page > 1 {
        state.current_page = Some(args.page);
    }
    let mut view = ListView::from_view_state(Arc::clone(&api), args.page_size.unwrap_or(cfg.page_size), time, &state);
    if !args.group_by.is_empty() {
        let available = match api.attribute_keys(category).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "group-by key discovery failed; using names as given");
                args.group_by.iter().map(AttributeKey::resource).collect()
            }
        };
        view.set_group_by_names(&args.group_by, &available);
        if args.page > 1 {
            view.set_page(args.page);
        }
    }
    view.refresh();
    view.settle().await;
    info!(category = %category, filters = %describe(view.filters()), page = view.page(), "list loaded");
    Ok(view)
}

fn print_table<I: IntoIterator<Item = Vec<String>>>(cols: &[ColumnSpec], rows: I) {
    let header: Vec<String> = cols.iter().map(|c| format!("{:<w$}", c.label, w = c.width)).collect();
    println!("{}", header.join(" ").trim_end());
    for cells in rows {
        let line: Vec<String> = cells.iter().zip(cols).map(|(v, c)| format!("{:<w$}", v, w = c.width)).collect();
        println!("{}", line.join(" ").trim_end());
    }
}

fn print_list(view: &ListView, output: Output) -> Result<()> {
    let category = view.category();
    match view.outcome() {
        ListOutcome::Error(msg) => bail!("{} list failed: {}", category, msg),
        ListOutcome::Loading => bail!("{} list did not load", category),
        ListOutcome::NoData => {
            eprintln!("No {} reported in this time range. Check that the cluster's infra metrics collection is running.", category);
            return Ok(());
        }
        ListOutcome::NoResultsForQuery => {
            eprintln!("No {} match the current query: {}", category, describe(view.filters()));
            return Ok(());
        }
        ListOutcome::Rows => {}
    }
    let snap = view.snapshot();
    match output {
        Output::Json => {
            let body = serde_json::json!({
                "category": category.as_str(),
                "page": view.page(),
                "total": snap.total(),
                "records": snap.records(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Output::Human => {
            if view.group_by().is_empty() {
                let cols = columns_for(category);
                print_table(&cols, snap.records().iter().map(|r| render_row(&cols, r)));
            } else {
                let cols = grouped_columns_for(category, view.group_by());
                print_table(&cols, view.grouped_rows().iter().map(|g| render_grouped_row(&cols, g, view.group_by())));
            }
            println!("page {} • {} rows • {} total", view.page(), snap.records().len(), snap.total());
        }
    }
    Ok(())
}

fn print_records(title: &str, rows: &[LogRecord], output: Output) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "view": title, "rows": rows }))?),
        Output::Human => {
            println!("── {} ({})", title, rows.len());
            for r in rows {
                println!("{}  {}", r.id().unwrap_or("-"), r.body().unwrap_or_default());
            }
        }
    }
    Ok(())
}

fn print_series(series: &[Series], output: Output) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "view": "metrics", "series": series }))?),
        Output::Human => {
            println!("── metrics ({})", series.len());
            for s in series {
                let labels: Vec<String> = s.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                let last = s.values.last().and_then(|p| p.as_f64());
                println!(
                    "{}  points={} last={}",
                    labels.join(","),
                    s.values.len(),
                    last.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".into())
                );
            }
        }
    }
    Ok(())
}

/// Walk `pages` pages of a logs-like sub-view with the keyset cursor, syncing each
/// cursor move back into the drawer.
async fn page_records(
    api: &dyn InfraApi,
    drawer: &mut DetailDrawer,
    state: &mut ViewState,
    view: DrawerView,
    page_size: u32,
    pages: u32,
    output: Output,
) -> Result<()> {
    let base = match view {
        DrawerView::Events => drawer.events_filters().clone(),
        _ => drawer.logs_filters().clone(),
    };
    let mut pager = KeysetPager::new(page_size, base);
    for _ in 0..pages.max(1) {
        let resp = api.query_range(&pager.request(DataSource::Logs, drawer.time())).await?;
        let rows = resp.list().to_vec();
        pager.on_results(&rows);
        print_records(&format!("{} page {}", view, pager.page()), &rows, output)?;
        let Some(next) = pager.handle_next(&rows) else { break };
        match view {
            DrawerView::Events => drawer.change_events_filters(&next, state),
            _ => drawer.change_logs_filters(&next, state),
        };
    }
    if pager.has_reached_end() {
        eprintln!("end of {}", view);
    }
    Ok(())
}

async fn run_drawer(
    api: Arc<dyn InfraApi>,
    cfg: &ApiConfig,
    mut view: ListView,
    row: usize,
    sub_view: DrawerView,
    sub_filters: &[String],
    pages: u32,
    output: Output,
) -> Result<()> {
    if !view.click_row(row) {
        bail!("row {} of the {} list is not selectable", row, view.category());
    }
    view.settle().await;
    let entity = view.selected_entity().context("selected entity is no longer in the list")?;
    let mut state = ViewState::default();
    view.write_view_state(&mut state);
    let mut drawer = DetailDrawer::open(view.category(), entity, view.time(), &mut state)
        .context("selected entity has no identifier")?;
    drawer.switch_view(sub_view, &mut state);
    if !sub_filters.is_empty() {
        let extra = FilterTree::new(parse_filters(sub_filters)?);
        match sub_view {
            DrawerView::Logs => drawer.change_logs_filters(&extra, &mut state),
            DrawerView::Traces => drawer.change_traces_filters(&extra, &mut state),
            DrawerView::Events => drawer.change_events_filters(&extra, &mut state),
            DrawerView::Metrics => bail!("--where applies to logs, traces and events"),
        };
    }

    match sub_view {
        DrawerView::Logs | DrawerView::Events => {
            page_records(api.as_ref(), &mut drawer, &mut state, sub_view, cfg.page_size, pages, output).await?;
        }
        DrawerView::Metrics | DrawerView::Traces => {
            let data = drawer.load(api.as_ref(), cfg.page_size).await;
            match sub_view {
                DrawerView::Traces => match data.traces {
                    Ok(rows) => print_records("traces", &rows, output)?,
                    Err(e) => eprintln!("traces: {}", e.display_message()),
                },
                _ => match data.metrics {
                    Ok(series) => print_series(&series, output)?,
                    Err(e) => eprintln!("metrics: {}", e.display_message()),
                },
            }
        }
    }

    if let Some(q) = drawer.explorer_query() {
        let base = url::Url::parse(&cfg.base_url).with_context(|| format!("invalid base url {}", cfg.base_url))?;
        println!("explorer: {}", q.url(&base)?);
    }
    println!("state: {}", state.encode());
    Ok(())
}

fn print_state(state: &ViewState, output: Output) -> Result<()> {
    let body = serde_json::json!({
        "category": state.category.map(|c| c.as_str()),
        "view": state.view.map(|v| v.as_str()),
        "selected": state.selected,
        "filters": state.filters,
        "groupBy": state.group_by,
        "orderBy": state.order_by,
        "currentPage": state.current_page,
        "logFilters": state.log_filters,
        "tracesFilters": state.traces_filters,
        "eventsFilters": state.events_filters,
    });
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(&body)?),
        Output::Human => {
            println!("category: {}", state.category_or_default());
            println!("view:     {}", state.view.map(|v| v.as_str()).unwrap_or("-"));
            println!("selected: {}", state.selected.as_deref().unwrap_or("-"));
            println!("filters:  {}", state.filters.as_ref().map(describe).unwrap_or_else(|| "-".into()));
            let groups: Vec<&str> = state.group_by.iter().flatten().map(|k| k.key.as_str()).collect();
            println!("groupBy:  {}", if groups.is_empty() { "-".to_string() } else { groups.join(", ") });
            println!("page:     {}", state.current_page.unwrap_or(1));
            for (name, tree) in [("logs", &state.log_filters), ("traces", &state.traces_filters), ("events", &state.events_filters)] {
                if let Some(t) = tree {
                    println!("{:<9} {}", format!("{}:", name), describe(t));
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let cfg = api_config(&cli);
    let time = TimeRange::last(parse_since(&cli.since)?);

    if let Commands::State { query, strict } = &cli.command {
        let state = if *strict { ViewState::decode_strict(query)? } else { ViewState::decode(query) };
        return print_state(&state, cli.output);
    }

    let api: Arc<dyn InfraApi> = Arc::new(HttpApi::new(&cfg)?);
    match &cli.command {
        Commands::Ls(args) => {
            let view = open_list(Arc::clone(&api), &cfg, time, args).await?;
            print_list(&view, cli.output)?;
            let mut state = ViewState::default();
            view.write_view_state(&mut state);
            if cli.output == Output::Human {
                println!("state: {}", state.encode());
            }
        }
        Commands::Drill { list, row, view_all } => {
            if list.group_by.is_empty() {
                bail!("drill needs at least one --group-by");
            }
            let mut view = open_list(Arc::clone(&api), &cfg, time, list).await?;
            if !view.click_row(*row) {
                bail!("no group row {}", row);
            }
            view.settle().await;
            let drill = view.drill_down();
            let snap = drill.snapshot();
            if let Some(err) = &snap.error {
                bail!("drill-down failed: {}", err);
            }
            let cols = columns_for(view.category());
            print_table(&cols, snap.records().iter().map(|r| render_row(&cols, r)));
            if drill.show_view_all() {
                println!("{} of {} shown; pass --view-all to list them all", snap.records().len(), snap.total());
            }
            if *view_all {
                view.view_all();
                view.settle().await;
                print_list(&view, cli.output)?;
            }
        }
        Commands::Drawer { list, row, view, sub_filters, pages } => {
            let sub_view = DrawerView::from_str(view)?;
            let list_view = open_list(Arc::clone(&api), &cfg, time, list).await?;
            run_drawer(Arc::clone(&api), &cfg, list_view, *row, sub_view, sub_filters, *pages, cli.output).await?;
        }
        Commands::Keys { category } => {
            let category = K8sCategory::from_str(category)?;
            let keys = api.attribute_keys(category).await.map_err(|e| anyhow::anyhow!(e.display_message()))?;
            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&keys)?),
                Output::Human => {
                    for k in keys {
                        println!("{} • {} • {}", k.key, k.data_type, k.r#type);
                    }
                }
            }
        }
        Commands::State { .. } => {}
    }
    Ok(())
}
