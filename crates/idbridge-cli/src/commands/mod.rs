pub mod groups;
pub mod password;
pub mod users;

use idbridge_provider::Page;

use crate::cli::PageArgs;

fn page(args: &PageArgs) -> Page {
    match args.max {
        Some(max) => Page::new(args.first, max),
        None => Page {
            first_result: args.first,
            max_results: None,
        },
    }
}
