use anyhow::{Context, Result};
use idbridge_provider::{IdentitySession, UserQuery};

use crate::cli::{OutputFormat, UsersArgs};
use crate::output::{print_count, print_users};

pub async fn find(session: &IdentitySession, args: &UsersArgs, format: OutputFormat) -> Result<()> {
    let query = query(args);

    if args.page.count {
        let count = session
            .count_users(&query)
            .await
            .context("User count failed")?;
        print_count(count, format);
        return Ok(());
    }

    let users = session
        .find_users(&query, super::page(&args.page))
        .await
        .context("User query failed")?;
    print_users(&users, format);
    Ok(())
}

fn query(args: &UsersArgs) -> UserQuery {
    let mut query = UserQuery::new();
    if let Some(id) = &args.id {
        query = query.id(id);
    }
    if let Some(email) = &args.email {
        query = query.email(email);
    }
    if let Some(pattern) = &args.first_name_like {
        query = query.first_name_like(pattern);
    }
    if let Some(pattern) = &args.last_name_like {
        query = query.last_name_like(pattern);
    }
    if let Some(group) = &args.group {
        query = query.member_of_group(group);
    }
    query
}
