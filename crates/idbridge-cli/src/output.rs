use colored::Colorize;
use idbridge_provider::{Group, User};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_users(users: &[User], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&users),
        OutputFormat::Table => {
            if users.is_empty() {
                println!("No users found.");
                return;
            }
            let mut builder = Builder::default();
            builder.push_record(["ID", "First name", "Last name", "E-mail"]);
            for row in user_rows(users) {
                builder.push_record(row);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
}

pub fn print_groups(groups: &[Group], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&groups),
        OutputFormat::Table => {
            if groups.is_empty() {
                println!("No groups found.");
                return;
            }
            let mut builder = Builder::default();
            builder.push_record(["ID", "Name", "Type"]);
            for row in group_rows(groups) {
                builder.push_record(row);
            }
            println!("{}", builder.build().with(Style::rounded()));
        }
    }
}

pub fn print_count(count: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "count": count })),
        OutputFormat::Table => println!("{}: {count}", "Total".cyan()),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => print_error(&format!("Failed to encode output: {e}")),
    }
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn dash_if_empty(value: &str) -> String {
    if value.is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn user_rows(users: &[User]) -> Vec<[String; 4]> {
    users
        .iter()
        .map(|u| {
            [
                u.id.clone(),
                dash_if_empty(&u.first_name),
                dash_if_empty(&u.last_name),
                dash_if_empty(&u.email),
            ]
        })
        .collect()
}

fn group_rows(groups: &[Group]) -> Vec<[String; 3]> {
    groups
        .iter()
        .map(|g| [g.id.clone(), g.name.clone(), g.group_type.to_string()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use idbridge_provider::GroupType;

    #[test]
    fn test_user_rows_fill_missing_fields() {
        let rows = user_rows(&[User {
            id: "alice".to_string(),
            first_name: "Alice".to_string(),
            last_name: String::new(),
            email: "alice@example.com".to_string(),
        }]);
        assert_eq!(rows, vec![["alice", "Alice", "-", "alice@example.com"].map(String::from)]);
    }

    #[test]
    fn test_group_rows_show_type() {
        let rows = group_rows(&[Group {
            id: "/admins".to_string(),
            name: "admins".to_string(),
            group_type: GroupType::System,
        }]);
        assert_eq!(rows, vec![["/admins", "admins", "system"].map(String::from)]);
    }
}
