//! Plain-text rendering of posts for the CLI and MCP tools.

use std::fmt::Write;

use crate::post::Post;

/// One entry per post, newest first as given.
#[must_use]
pub fn post_list(posts: &[Post]) -> String {
    if posts.is_empty() {
        return "No posts found.".to_string();
    }

    let mut output = String::new();
    for post in posts {
        let badges = if post.badges.is_empty() {
            String::new()
        } else {
            format!(" [{}]", post.badges.join(", "))
        };
        let _ = writeln!(
            output,
            "- **{}**: {}{}\n  {} ({}), {}, {} view(s)\n  `{}`",
            post.category,
            post.title,
            badges,
            post.author,
            post.department,
            post.post_date,
            post.views,
            post.id
        );
    }
    output
}

/// Search hits followed by a result count.
#[must_use]
pub fn search_results(query: &str, posts: &[Post]) -> String {
    if posts.is_empty() {
        return format!("No matches found for '{query}'");
    }

    let mut output = String::new();
    for post in posts {
        let _ = write!(
            output,
            "## {}\n**Id:** {}\n**Category:** {} | **Author:** {} ({}) | **Date:** {}\n\n",
            post.title, post.id, post.category, post.author, post.department, post.post_date
        );
    }
    let _ = write!(output, "*{} result(s) found*", posts.len());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, title: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            department: "IT부서".to_string(),
            author: "홍길동".to_string(),
            views: 2,
            post_date: "2024-05-01".to_string(),
            end_date: None,
            category: "공지".to_string(),
            badges: vec!["new".to_string()],
            content: "<p>본문</p>".to_string(),
            attachments: vec![],
            uploaded_images: vec![],
        }
    }

    #[test]
    fn empty_list() {
        assert_eq!(post_list(&[]), "No posts found.");
    }

    #[test]
    fn list_shows_id_and_badges() {
        let output = post_list(&[post("abc", "테스트 게시물")]);

        assert!(output.contains("**공지**: 테스트 게시물 [new]"));
        assert!(output.contains("`abc`"));
        assert!(output.contains("2 view(s)"));
    }

    #[test]
    fn search_results_count() {
        let output = search_results("테스트", &[post("a", "one"), post("b", "two")]);

        assert!(output.contains("## one"));
        assert!(output.ends_with("*2 result(s) found*"));
    }

    #[test]
    fn search_without_results() {
        assert_eq!(search_results("zzz", &[]), "No matches found for 'zzz'");
    }
}
