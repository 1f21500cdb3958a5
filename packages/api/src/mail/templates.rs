//! Transactional email bodies. Every function returns `(html, text)`.

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn layout(title: &str, content: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="pt">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f4f4f5; color: #18181b;">
    <table role="presentation" style="width: 100%; border-collapse: collapse;">
        <tr>
            <td style="padding: 40px 20px;">
                <table role="presentation" style="max-width: 600px; margin: 0 auto; background: #ffffff; border-radius: 12px; border: 1px solid #e4e4e7;">
                    <tr>
                        <td style="padding: 32px 40px 16px; text-align: center; border-bottom: 1px solid #e4e4e7;">
                            <span style="font-size: 24px; font-weight: 700; color: #16a34a;">Kambafy</span>
                            <h1 style="margin: 16px 0 0; font-size: 22px; font-weight: 700;">{title}</h1>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 32px 40px; font-size: 15px; line-height: 1.6;">
                            {content}
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 16px 40px 32px; text-align: center; font-size: 12px; color: #71717a;">
                            Kambafy &middot; Este email foi enviado automaticamente.
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>"##
    )
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        r#"<div style="margin-bottom: 8px;"><span style="color: #71717a;">{}:</span> <strong>{}</strong></div>"#,
        escape(label),
        escape(value)
    )
}

pub fn purchase_confirmation(
    customer_name: &str,
    product_name: &str,
    order_id: &str,
    amount_display: &str,
) -> (String, String) {
    let content = format!(
        r#"<p>Olá {customer},</p>
<p>O seu pagamento foi confirmado. Obrigado pela sua compra!</p>
<div style="background: #f4f4f5; border-radius: 8px; padding: 16px; margin: 24px 0;">{product}{order}{amount}</div>"#,
        customer = escape(customer_name),
        product = detail_row("Produto", product_name),
        order = detail_row("Pedido", order_id),
        amount = detail_row("Valor", amount_display),
    );

    let text = format!(
        "Olá {customer_name},\n\nO seu pagamento foi confirmado. Obrigado pela sua compra!\n\n\
         Produto: {product_name}\nPedido: {order_id}\nValor: {amount_display}\n"
    );

    (layout("Compra confirmada", &content), text)
}

pub fn seller_sale_notification(
    seller_name: &str,
    product_name: &str,
    customer_name: &str,
    order_id: &str,
    amount_display: &str,
) -> (String, String) {
    let content = format!(
        r#"<p>Olá {seller},</p>
<p>Acabou de realizar uma nova venda.</p>
<div style="background: #f4f4f5; border-radius: 8px; padding: 16px; margin: 24px 0;">{product}{customer}{order}{amount}</div>"#,
        seller = escape(seller_name),
        product = detail_row("Produto", product_name),
        customer = detail_row("Cliente", customer_name),
        order = detail_row("Pedido", order_id),
        amount = detail_row("Valor", amount_display),
    );

    let text = format!(
        "Olá {seller_name},\n\nAcabou de realizar uma nova venda.\n\n\
         Produto: {product_name}\nCliente: {customer_name}\nPedido: {order_id}\nValor: {amount_display}\n"
    );

    (layout("Nova venda", &content), text)
}

pub fn access_granted(
    student_name: &str,
    area_name: &str,
    area_url: &str,
    login_email: &str,
    temporary_password: &str,
    seller_name: &str,
) -> (String, String) {
    let content = format!(
        r#"<p>Olá {student},</p>
<p>{seller} concedeu-lhe acesso a <strong>{area}</strong>.</p>
<div style="background: #f4f4f5; border-radius: 8px; padding: 16px; margin: 24px 0;">{login}{password}</div>
<p style="text-align: center;"><a href="{url}" style="display: inline-block; background: #16a34a; color: #ffffff; text-decoration: none; font-weight: 600; padding: 12px 28px; border-radius: 8px;">Aceder agora</a></p>
<p style="font-size: 13px; color: #71717a;">Recomendamos que altere a palavra-passe no primeiro acesso.</p>"#,
        student = escape(student_name),
        seller = escape(seller_name),
        area = escape(area_name),
        login = detail_row("Email", login_email),
        password = detail_row("Palavra-passe temporária", temporary_password),
        url = escape(area_url),
    );

    let text = format!(
        "Olá {student_name},\n\n{seller_name} concedeu-lhe acesso a {area_name}.\n\n\
         Email: {login_email}\nPalavra-passe temporária: {temporary_password}\n\n\
         Aceda em: {area_url}\n\nRecomendamos que altere a palavra-passe no primeiro acesso.\n"
    );

    (layout("Acesso liberado", &content), text)
}

pub fn payment_instructions(
    customer_name: &str,
    product_name: &str,
    entity: &str,
    reference: &str,
    amount_display: &str,
    voucher_url: Option<&str>,
) -> (String, String) {
    let voucher_html = voucher_url
        .map(|url| {
            format!(
                r#"<p style="text-align: center;"><a href="{}" style="color: #16a34a;">Ver comprovativo</a></p>"#,
                escape(url)
            )
        })
        .unwrap_or_default();

    let content = format!(
        r#"<p>Olá {customer},</p>
<p>Para concluir a compra de <strong>{product}</strong>, efetue o pagamento com os dados abaixo.</p>
<div style="background: #f4f4f5; border-radius: 8px; padding: 16px; margin: 24px 0;">{entity}{reference}{amount}</div>
{voucher}"#,
        customer = escape(customer_name),
        product = escape(product_name),
        entity = detail_row("Entidade", entity),
        reference = detail_row("Referência", reference),
        amount = detail_row("Valor", amount_display),
        voucher = voucher_html,
    );

    let mut text = format!(
        "Olá {customer_name},\n\nPara concluir a compra de {product_name}, efetue o pagamento com os dados abaixo.\n\n\
         Entidade: {entity}\nReferência: {reference}\nValor: {amount_display}\n"
    );
    if let Some(url) = voucher_url {
        text.push_str(&format!("\nComprovativo: {url}\n"));
    }

    (layout("Instruções de pagamento", &content), text)
}
