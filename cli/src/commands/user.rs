use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use super::helpers::{exit_not_found, read_password};
use crate::context::AppContext;

pub(crate) fn cmd_user_register(
    ctx: &AppContext,
    email: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    age: Option<i64>,
    json: bool,
) -> Result<()> {
    let password = read_password("Choose a password (min 8 characters): ")?;
    let user = ctx
        .service
        .register_user(email, &password, first_name, last_name, age)?;
    ctx.service.set_active_user(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        let name = user.display_name();
        let id = user.id;
        println!("Registered {name} (id: {id}) and signed in");
    }
    Ok(())
}

pub(crate) fn cmd_user_login(ctx: &AppContext, email: &str, json: bool) -> Result<()> {
    let password = read_password("Password: ")?;
    let Some(user) = ctx.service.authenticate(email, &password)? else {
        bail!("Invalid email or password");
    };
    ctx.service.set_active_user(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("Signed in as {}", user.display_name());
    }
    Ok(())
}

pub(crate) fn cmd_user_list(ctx: &AppContext, json: bool) -> Result<()> {
    let users = ctx.service.list_users()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    if users.is_empty() {
        println!("No users yet. Create one with: nutrilog user register <email>");
        return Ok(());
    }

    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Email")]
        email: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Age")]
        age: String,
        #[tabled(rename = "Active")]
        active: &'static str,
    }

    let active_id = ctx.service.active_user()?.map(|u| u.id);
    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            email: u.email.clone(),
            name: u.display_name(),
            age: u.age.map(|a| a.to_string()).unwrap_or_default(),
            active: if Some(u.id) == active_id { "*" } else { "" },
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_user_whoami(ctx: &AppContext, json: bool) -> Result<()> {
    let Some(user) = ctx.service.active_user()? else {
        exit_not_found("Not signed in", json);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        println!("{} <{}> (id: {})", user.display_name(), user.email, user.id);
    }
    Ok(())
}
