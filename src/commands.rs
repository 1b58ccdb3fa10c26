//! CLI subcommands and their plain-text output.

use clap::Subcommand;
use color_eyre::Result;
use std::collections::HashMap;

use crate::cache::CacheStatus;
use crate::content::types::{Category, PromptItem, Style, TimelineItem};
use crate::session::Session;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// List prompts, newest first
  #[command(alias = "ls")]
  Items {
    /// Only prompts in this category (slug)
    #[arg(short, long)]
    category: Option<String>,
  },
  /// Show one prompt
  Item { id: String },
  /// List timeline prompts
  #[command(alias = "tl")]
  Timeline,
  /// Show one timeline prompt with its segments
  TimelineItem { id: String },
  /// List categories
  Categories,
  /// List styles
  Styles,
  /// Store an access token issued by the auth service
  SignIn {
    #[arg(long, env = "PROMPTLIB_ACCESS_TOKEN", hide_env_values = true)]
    token: String,
  },
  /// Forget the access token and clear the cache
  SignOut,
  /// Drop all cached content
  ClearCache,
  /// Show cache versions and entry counts
  CacheStatus,
}

/// Run one command against the session, printing to stdout.
pub async fn run(command: Command, session: &Session) -> Result<()> {
  let content = session.content();
  let output = match command {
    Command::Items { category } => {
      let (items, categories) = futures::try_join!(
        content.list_items(category.as_deref()),
        content.list_categories()
      )?;
      format_items(&items, &categories)
    }
    Command::Item { id } => format_item(&content.get_item(&id).await?),
    Command::Timeline => format_timeline_items(&content.list_timeline_items().await?),
    Command::TimelineItem { id } => format_timeline_item(&content.get_timeline_item(&id).await?),
    Command::Categories => format_categories(&content.list_categories().await?),
    Command::Styles => format_styles(&content.list_styles().await?),
    Command::SignIn { token } => {
      session.sign_in(&token)?;
      "Signed in.\n".to_string()
    }
    Command::SignOut => {
      session.sign_out()?;
      "Signed out. Cache cleared.\n".to_string()
    }
    Command::ClearCache => {
      session.clear_cache();
      "Cache cleared.\n".to_string()
    }
    Command::CacheStatus => {
      let statuses = [
        content.items_cache().status()?,
        content.timeline_cache().status()?,
      ];
      format_status(&statuses, session.is_signed_in())
    }
  };

  print!("{}", output);
  Ok(())
}

fn format_items(items: &[PromptItem], categories: &[Category]) -> String {
  if items.is_empty() {
    return "No prompts found.\n".to_string();
  }

  let names: HashMap<&str, &str> = categories
    .iter()
    .map(|c| (c.slug.as_str(), c.name.as_str()))
    .collect();

  items
    .iter()
    .map(|item| {
      let category = names
        .get(item.category.as_str())
        .copied()
        .unwrap_or(item.category.as_str());
      format!("{:<12} [{}] {}\n", item.id, category, item.title)
    })
    .collect()
}

fn format_item(item: &PromptItem) -> String {
  let mut lines = vec![
    item.title.clone(),
    format!("  id:       {}", item.id),
    format!("  category: {}", item.category),
  ];
  if let Some(style) = &item.style {
    lines.push(format!("  style:    {}", style));
  }
  if !item.tags.is_empty() {
    lines.push(format!("  tags:     {}", item.tags.join(", ")));
  }
  lines.push(format!("  created:  {}", item.created_at.format("%Y-%m-%d")));
  if let Some(url) = &item.video_url {
    lines.push(format!("  video:    {}", url));
  }
  lines.push(String::new());
  lines.push(item.prompt.clone());

  lines.iter().map(|line| format!("{}\n", line)).collect()
}

fn format_timeline_items(items: &[TimelineItem]) -> String {
  if items.is_empty() {
    return "No timeline prompts found.\n".to_string();
  }

  items
    .iter()
    .map(|item| {
      format!(
        "{:<12} [{}] {} ({} segments, {:.1}s)\n",
        item.id,
        item.category,
        item.title,
        item.segments.len(),
        item.duration_seconds()
      )
    })
    .collect()
}

fn format_timeline_item(item: &TimelineItem) -> String {
  let mut out = format!("{} [{}]\n", item.title, item.category);
  for segment in &item.segments {
    out.push_str(&format!(
      "  {:>6.1}s - {:>6.1}s  {}\n",
      segment.start_seconds, segment.end_seconds, segment.prompt
    ));
  }
  out
}

fn format_categories(categories: &[Category]) -> String {
  categories
    .iter()
    .map(|c| format!("{:<20} {}\n", c.slug, c.name))
    .collect()
}

fn format_styles(styles: &[Style]) -> String {
  styles
    .iter()
    .map(|s| format!("{:<20} {}\n", s.name, s.category))
    .collect()
}

fn format_status(statuses: &[CacheStatus], signed_in: bool) -> String {
  let mut out = format!("signed in: {}\n", if signed_in { "yes" } else { "no" });
  for status in statuses {
    out.push_str(&format!(
      "{}: version {}, fresh for {}s, {} entries ({} orphaned)\n",
      status.namespace,
      status.version,
      status.freshness.num_seconds(),
      status.current_entries,
      status.orphaned_entries
    ));
  }
  out
}
