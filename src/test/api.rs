#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde_json::{Value, json};

    use crate::config::AttendancePolicy;
    use crate::test::test_console::{
        ADMIN_EMAIL, PRINCIPAL_EMAIL, STANDARD_PASSWORD, TestConsoleBuilder,
        create_standard_console, login_test_user, setup_test_client,
    };

    async fn body_json(response: LocalResponse<'_>) -> Value {
        let body = response.into_string().await.expect("response body");
        serde_json::from_str(&body).expect("JSON body")
    }

    async fn admin_client() -> Client {
        let client = setup_test_client(create_standard_console().await).await;
        assert_eq!(
            login_test_user(&client, ADMIN_EMAIL, STANDARD_PASSWORD).await,
            Status::Ok
        );
        client
    }

    async fn post_json(client: &Client, uri: &str, body: Value) -> (Status, Value) {
        let response = client
            .post(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn put_json(client: &Client, uri: &str, body: Value) -> (Status, Value) {
        let response = client
            .put(uri.to_string())
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn get_json(client: &Client, uri: &str) -> (Status, Value) {
        let response = client.get(uri.to_string()).dispatch().await;
        let status = response.status();
        (status, body_json(response).await)
    }

    /// Adds "11th Grade" with one section holding two students.
    async fn seed_section(client: &Client) -> (i64, i64) {
        let (status, grade) =
            post_json(client, "/api/organizations/1/grades", json!({ "name": "11th Grade" }))
                .await;
        assert_eq!(status, Status::Created);
        let grade_id = grade["data"]["id"].as_i64().unwrap();

        let response = client
            .post(format!("/api/organizations/1/grades/{}/sections", grade_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let section = body_json(response).await;
        assert_eq!(section["data"]["name"], "Section A");
        let section_id = section["data"]["id"].as_i64().unwrap();

        for (name, roll_no) in [("Asha Menon", "R-101"), ("Khan, Bilal", "R-102")] {
            let (status, _) = post_json(
                client,
                &format!("/api/sections/{}/students", section_id),
                json!({ "name": name, "roll_no": roll_no }),
            )
            .await;
            assert_eq!(status, Status::Created);
        }

        (grade_id, section_id)
    }

    #[rocket::async_test]
    async fn test_login_api() {
        let client = setup_test_client(create_standard_console().await).await;

        let (status, body) = post_json(
            &client,
            "/api/login",
            json!({ "email": PRINCIPAL_EMAIL, "password": STANDARD_PASSWORD }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], PRINCIPAL_EMAIL);
        assert_eq!(body["user"]["role"], "principal");

        let (status, body) = post_json(
            &client,
            "/api/login",
            json!({ "email": PRINCIPAL_EMAIL, "password": "wrong_password" }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[rocket::async_test]
    async fn test_login_rejects_malformed_email() {
        let client = setup_test_client(create_standard_console().await).await;

        let (status, body) = post_json(
            &client,
            "/api/login",
            json!({ "email": "not-an-email", "password": STANDARD_PASSWORD }),
        )
        .await;

        assert_eq!(status, Status::UnprocessableEntity);
        assert!(body["errors"]["email"].is_array());
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let client = setup_test_client(create_standard_console().await).await;

        for endpoint in ["/api/me", "/api/organizations", "/api/events", "/api/selection"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_logout_ends_session() {
        let client = admin_client().await;

        let (status, me) = get_json(&client, "/api/me").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(me["role"], "admin");

        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_organization_crud_queues_sync() {
        let client = admin_client().await;

        let (status, created) =
            post_json(&client, "/api/organizations", json!({ "name": "University B" })).await;
        assert_eq!(status, Status::Created);
        assert_eq!(created["data"]["id"], 2);
        assert_eq!(created["data"]["has_password"], false);
        let ticket = created["sync"].as_u64().unwrap();

        let (status, updated) = put_json(
            &client,
            "/api/organizations/2",
            json!({
                "address": "456 University Ave",
                "email": "info@universityb.edu",
                "password": "secret"
            }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(updated["data"]["address"], "456 University Ave");
        assert_eq!(updated["data"]["has_password"], true);
        assert!(updated["data"].get("password").is_none());

        let (status, listed) = get_json(&client, "/api/organizations").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(listed.as_array().unwrap().len(), 2);

        let mut settled = Value::Null;
        for _ in 0..200 {
            let (status, state) = get_json(&client, &format!("/api/sync/{}", ticket)).await;
            assert_eq!(status, Status::Ok);
            if state["state"] != "pending" {
                settled = state;
                break;
            }
            rocket::tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(settled["state"], "synced");

        let response = client.get("/api/sync/9999").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client.get("/api/organizations/42").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_principal_cannot_manage_organizations() {
        let client = setup_test_client(create_standard_console().await).await;
        login_test_user(&client, PRINCIPAL_EMAIL, STANDARD_PASSWORD).await;

        let (status, _) =
            post_json(&client, "/api/organizations", json!({ "name": "College C" })).await;
        assert_eq!(status, Status::Forbidden);

        let (status, _) = put_json(
            &client,
            "/api/organizations/1",
            json!({ "phone": "123-456-7890" }),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, _) =
            post_json(&client, "/api/organizations/1/admins", json!({ "name": "Ravi" })).await;
        assert_eq!(status, Status::Forbidden);

        let (status, grade) =
            post_json(&client, "/api/organizations/1/grades", json!({ "name": "Grade 1" })).await;
        assert_eq!(status, Status::Created);
        assert_eq!(grade["data"]["name"], "Grade 1");
    }

    #[rocket::async_test]
    async fn test_admin_list_management() {
        let client = admin_client().await;

        let (status, admins) =
            post_json(&client, "/api/organizations/1/admins", json!({ "name": "Ravi" })).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(admins["data"], json!(["Ravi"]));

        let (status, body) =
            post_json(&client, "/api/organizations/1/admins", json!({ "name": "" })).await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(body["errors"]["name"].is_array());

        let response = client.delete("/api/organizations/1/admins/5").dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
        let body = body_json(response).await;
        assert!(body["errors"]["index"].is_array());

        let response = client.delete("/api/organizations/1/admins/0").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(body_json(response).await["data"], "Ravi");
    }

    #[rocket::async_test]
    async fn test_structure_flow() {
        let client = admin_client().await;
        let (grade_id, section_id) = seed_section(&client).await;

        let (status, grades) = get_json(&client, "/api/organizations/1/grades").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(grades[0]["name"], "11th Grade");

        let (status, teacher) = post_json(
            &client,
            "/api/organizations/1/teachers",
            json!({ "name": "Mr. Brown", "subject": "Mathematics" }),
        )
        .await;
        assert_eq!(status, Status::Created);
        let teacher_id = teacher["data"]["id"].as_i64().unwrap();

        let (status, section) = put_json(
            &client,
            &format!("/api/sections/{}", section_id),
            json!({ "name": "S1", "teacher_id": teacher_id }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(section["data"]["name"], "S1");

        let (status, view) = get_json(&client, &format!("/api/sections/{}", section_id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(view["organization_id"], 1);
        assert_eq!(view["grade_id"], grade_id);
        assert_eq!(view["teacher"]["name"], "Mr. Brown");

        let (_, found) = get_json(
            &client,
            &format!("/api/sections/{}/students?search=khan", section_id),
        )
        .await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["roll_no"], "R-102");

        let response = client
            .delete(format!("/api/organizations/1/teachers/{}", teacher_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let (_, view) = get_json(&client, &format!("/api/sections/{}", section_id)).await;
        assert!(view["teacher"].is_null());

        let response = client
            .delete(format!("/api/grades/{}/sections/{}", grade_id, section_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let (_, sections) = get_json(&client, &format!("/api/grades/{}/sections", grade_id)).await;
        assert!(sections.as_array().unwrap().is_empty());

        let response = client
            .delete(format!("/api/organizations/1/grades/{}", grade_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get(format!("/api/grades/{}/sections", grade_id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_events_respect_section_visibility() {
        let client = admin_client().await;
        let (_, section_id) = seed_section(&client).await;

        let (status, _) = post_json(
            &client,
            "/api/events",
            json!({ "name": "Sports Day", "date": "2024-10-22" }),
        )
        .await;
        assert_eq!(status, Status::Created);
        let (status, lab) = post_json(
            &client,
            "/api/events",
            json!({ "name": "Lab visit", "date": "2024-10-23", "section_id": section_id }),
        )
        .await;
        assert_eq!(status, Status::Created);

        let (_, global) = get_json(&client, "/api/events").await;
        assert_eq!(global.as_array().unwrap().len(), 1);

        let (_, scoped) = get_json(&client, &format!("/api/events?section={}", section_id)).await;
        assert_eq!(scoped.as_array().unwrap().len(), 2);

        let (_, on_day) = get_json(
            &client,
            &format!("/api/events?section={}&date=2024-10-23", section_id),
        )
        .await;
        assert_eq!(on_day[0]["name"], "Lab visit");

        let (_, dates) = get_json(&client, "/api/events/marked-dates").await;
        assert_eq!(dates, json!(["2024-10-22", "2024-10-23"]));

        let response = client.get("/api/events?date=22-10-2024").dispatch().await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let response = client
            .delete(format!("/api/events/{}", lab["id"]))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let (status, _) = post_json(
            &client,
            "/api/events",
            json!({ "name": "Orphan", "date": "2024-10-23", "section_id": 999 }),
        )
        .await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_attendance_and_report() {
        let console = TestConsoleBuilder::new()
            .admin(ADMIN_EMAIL)
            .organization("Mahathma Gandhi Memorial College")
            .attendance(AttendancePolicy {
                default_presence: Some(true),
            })
            .build()
            .await
            .expect("Failed to build test console");
        let client = setup_test_client(console).await;
        login_test_user(&client, ADMIN_EMAIL, STANDARD_PASSWORD).await;
        let (_, section_id) = seed_section(&client).await;

        let (status, set) = put_json(
            &client,
            "/api/attendance",
            json!({ "roll_no": "R-101", "date": "2024-10-07", "present": true }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(set["present"], true);

        let (status, toggled) = post_json(
            &client,
            "/api/attendance/toggle",
            json!({ "roll_no": "R-102", "date": "2024-10-07" }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(toggled["present"], false);

        let (status, summary) = get_json(
            &client,
            &format!("/api/sections/{}/attendance?date=2024-10-07", section_id),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(summary[0]["status"], "present");
        assert_eq!(summary[1]["status"], "absent");

        let response = client
            .get(format!(
                "/api/sections/{}/attendance/report?date=2024-10-07",
                section_id
            ))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let content_type = response.content_type().expect("content type");
        assert_eq!(content_type.sub(), "csv");
        assert_eq!(
            response.headers().get_one("Content-Disposition"),
            Some("attachment; filename=\"attendance_report_Section A_2024-10-07.csv\"")
        );
        let csv = response.into_string().await.unwrap();
        assert_eq!(
            csv.lines().collect::<Vec<_>>(),
            vec![
                "Name,Roll No.,Attendance",
                "Asha Menon,R-101,Present",
                "\"Khan, Bilal\",R-102,Absent",
            ]
        );
    }

    #[rocket::async_test]
    async fn test_toggle_without_default_is_not_found() {
        let client = admin_client().await;
        seed_section(&client).await;

        let (status, _) = post_json(
            &client,
            "/api/attendance/toggle",
            json!({ "roll_no": "R-101", "date": "2024-10-07" }),
        )
        .await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_notifications_chat_and_selection() {
        let client = admin_client().await;
        let (_, section_id) = seed_section(&client).await;

        let (status, _) = post_json(
            &client,
            "/api/notifications",
            json!({ "content": "Assembly at 9", "audience": { "kind": "teachers" } }),
        )
        .await;
        assert_eq!(status, Status::Created);
        let (status, _) =
            post_json(&client, "/api/notifications", json!({ "content": "" })).await;
        assert_eq!(status, Status::UnprocessableEntity);

        let (_, feed) = get_json(&client, "/api/notifications").await;
        assert_eq!(feed[0]["audience"]["kind"], "teachers");

        let (status, message) =
            post_json(&client, "/api/chat", json!({ "content": "Hello staff" })).await;
        assert_eq!(status, Status::Created);
        assert_eq!(message["sender"], ADMIN_EMAIL);
        let (_, thread) = get_json(&client, "/api/chat").await;
        assert_eq!(thread.as_array().unwrap().len(), 1);

        let (status, selection) = put_json(
            &client,
            "/api/selection",
            json!({ "organization": 1, "section": section_id }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(selection["section"], section_id);

        let (_, current) = get_json(&client, "/api/selection").await;
        assert_eq!(current, selection);

        let (status, _) = put_json(
            &client,
            "/api/selection",
            json!({ "organization": 7, "section": null }),
        )
        .await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_selection_rejects_section_of_other_organization() {
        let client = admin_client().await;
        let (_, section_id) = seed_section(&client).await;

        let (status, _) =
            post_json(&client, "/api/organizations", json!({ "name": "Hillside" })).await;
        assert_eq!(status, Status::Created);

        let (status, body) = put_json(
            &client,
            "/api/selection",
            json!({ "organization": 2, "section": section_id }),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(body["errors"]["validation"].is_array());

        let (_, current) = get_json(&client, "/api/selection").await;
        assert_eq!(current, json!({ "organization": null, "section": null }));
    }
}
