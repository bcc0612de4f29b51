use anyhow::{Context, Result};
use idbridge_provider::{GroupQuery, IdentitySession};

use crate::cli::{GroupsArgs, OutputFormat};
use crate::output::{print_count, print_groups};

pub async fn find(session: &IdentitySession, args: &GroupsArgs, format: OutputFormat) -> Result<()> {
    let query = query(args);

    if args.page.count {
        let count = session
            .count_groups(&query)
            .await
            .context("Group count failed")?;
        print_count(count, format);
        return Ok(());
    }

    let groups = session
        .find_groups(&query, super::page(&args.page))
        .await
        .context("Group query failed")?;
    print_groups(&groups, format);
    Ok(())
}

fn query(args: &GroupsArgs) -> GroupQuery {
    let mut query = GroupQuery::new();
    if let Some(id) = &args.id {
        query = query.id(id);
    }
    if let Some(pattern) = &args.name_like {
        query = query.name_like(pattern);
    }
    if let Some(member) = &args.member {
        query = query.member(member);
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_args() {
        let args = GroupsArgs {
            name_like: Some("adm%".to_string()),
            member: Some("alice".to_string()),
            ..GroupsArgs::default()
        };
        assert_eq!(query(&args), GroupQuery::new().name_like("adm%").member("alice"));
    }
}
